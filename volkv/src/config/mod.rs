use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use volkv_store::{Error, Result};

/// Mutually exclusive process modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Serve client traffic.
    Server,
    /// Reconstruct the metadata index from the volumes, then exit.
    Rebuild,
    /// Repair replication after a topology change, then exit.
    Rebalance,
}

#[derive(Debug, Parser)]
#[command(name = "volkv", version, about = "Replicated volume-backed key-value proxy")]
pub struct Opt {
    /// Run mode.
    #[arg(value_enum)]
    pub mode: Mode,

    /// Volume servers to use for storage, comma separated host:port.
    #[arg(long, value_delimiter = ',', required = true)]
    pub volumes: Vec<String>,

    /// Path to the metadata index database.
    #[arg(long)]
    pub db: PathBuf,

    /// Port for the server to listen on.
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Fallback server consulted for missing keys.
    #[arg(long)]
    pub fallback: Option<String>,

    /// Amount of replicas to make of the data.
    #[arg(long, default_value_t = 3)]
    pub replicas: usize,

    /// Amount of subvolumes, disks per machine.
    #[arg(long, default_value_t = 10)]
    pub subvolumes: u32,

    /// Protected deletes: soft-delete first, physical removal on UNLINK.
    #[arg(long)]
    pub protect: bool,

    /// Calculate and store MD5 checksums of values.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub md5sum: bool,

    /// Volume servers must respond in this amount of time or they are
    /// considered down, as a duration.
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub voltimeout: Duration,

    /// Verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Opt {
    /// Cross-field startup rules; violations are fatal.
    pub fn validate(&self) -> Result<()> {
        if self.db.as_os_str().is_empty() {
            return Err(Error::Config("need a path to the index database".to_string()));
        }
        if self.replicas == 0 {
            return Err(Error::Config("need at least one replica".to_string()));
        }
        if self.volumes.len() < self.replicas {
            return Err(Error::Config(format!(
                "need at least as many volumes as replicas, got {} volumes for {} replicas",
                self.volumes.len(),
                self.replicas
            )));
        }
        if self.subvolumes == 0 {
            return Err(Error::Config("need at least one subvolume per volume".to_string()));
        }
        Ok(())
    }
}
