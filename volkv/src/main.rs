mod config;
mod server;

use clap::Parser;
use config::Mode;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use volkv_store::{RecordIndex, Result, Store, StoreOptions, VolumeClient, Volumes};

fn setup_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let enable_color = std::io::stdout().is_terminal();

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_ansi(enable_color)
        .finish()
        .with(ErrorLayer::default());

    subscriber.try_init().expect("failed to set global default subscriber");
}

fn main() -> Result<()> {
    let opt = config::Opt::parse();

    setup_tracing(opt.verbose);

    run(opt)
}

#[tokio::main]
async fn run(opt: config::Opt) -> Result<()> {
    opt.validate()?;

    let client = VolumeClient::new(opt.voltimeout)?;
    let volumes = Volumes::probe(&opt.volumes, &client).await?;
    let index = RecordIndex::open(&opt.db)?;

    // A changed identity means the volume was wiped or replaced since the
    // last maintenance pass; its stored locations are stale until a
    // rebalance drops them.
    let snapshot = index.load_identities()?;
    for volume in volumes.iter() {
        if let Some(old) = snapshot.get(&volume.address) {
            if *old != volume.identity {
                warn!(volume = %volume.address, "volume identity changed since last maintenance, run rebalance");
            }
        }
    }

    let store = Store::new(
        index,
        volumes,
        client,
        StoreOptions {
            replicas: opt.replicas,
            subvolumes: opt.subvolumes,
            protect: opt.protect,
            md5sum: opt.md5sum,
            fallback: opt.fallback.clone(),
        },
    );

    match opt.mode {
        Mode::Server => server::serve(Arc::new(store), opt.port).await,
        Mode::Rebuild => {
            let summary = store.rebuild().await?;
            info!(keys = summary.keys, dropped = summary.dropped, "rebuild complete");
            Ok(())
        }
        Mode::Rebalance => {
            let summary = store.rebalance().await?;
            info!(
                examined = summary.examined,
                repaired = summary.repaired,
                skipped = summary.skipped,
                failed = summary.failed,
                "rebalance complete"
            );
            Ok(())
        }
    }
}
