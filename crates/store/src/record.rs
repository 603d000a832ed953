// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The per-key metadata record and its on-volume path scheme.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a record.
///
/// `Hard` is live and fully committed. `Soft` is logically deleted:
/// hidden from readers while physical copies may remain, pending an
/// explicit unlink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    #[default]
    Hard,
    Soft,
}

/// One replica reference: a volume address and the subvolume (logical
/// disk) holding the copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub volume: String,
    pub subvolume: u32,
}

impl Location {
    pub fn new<S: Into<String>>(volume: S, subvolume: u32) -> Self {
        Self {
            volume: volume.into(),
            subvolume,
        }
    }

    /// Path of `key`'s object on this location's volume.
    ///
    /// Two MD5-derived hex directories fan keys out below the subvolume;
    /// the leaf name is the url-safe base64 of the key itself.
    pub fn object_path(&self, key: &str) -> String {
        let (d0, d1) = key_fanout(key);
        format!("/sv{:02}/{:02x}/{:02x}/{}", self.subvolume, d0, d1, encode_key(key))
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("http://{}{}", self.volume, self.object_path(key))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/sv{:02}", self.volume, self.subvolume)
    }
}

/// The metadata unit stored per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Volumes holding a copy. Order is not semantically significant but
    /// is preserved for idempotent re-serialization.
    pub locations: Vec<Location>,
    pub state: RecordState,
    /// Hex MD5 of the content, computed once at write time when checksum
    /// verification is enabled.
    pub checksum: Option<String>,
}

impl Record {
    /// A record with zero locations is indistinguishable from "absent".
    pub fn exists(&self) -> bool {
        !self.locations.is_empty()
    }

    /// Whether readers may be served from this record.
    pub fn is_readable(&self) -> bool {
        self.exists() && self.state == RecordState::Hard
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// Hex MD5 of a payload, the content checksum format.
pub fn content_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Check a retrieved payload against its stored checksum.
pub fn verify_checksum(expected: &str, data: &[u8]) -> Result<()> {
    let actual = content_md5(data);
    if actual == expected {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

pub fn encode_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key.as_bytes())
}

pub fn decode_key(name: &str) -> Option<String> {
    let raw = URL_SAFE_NO_PAD.decode(name.as_bytes()).ok()?;
    String::from_utf8(raw).ok()
}

fn key_fanout(key: &str) -> (u8, u8) {
    let digest = md5::compute(key.as_bytes());
    (digest.0[0], digest.0[1])
}

/// Parse an on-volume object path back into (subvolume, key).
///
/// Accepts only paths produced by [`Location::object_path`]; the fan-out
/// directories must match the decoded key's digest, which catches foreign
/// files sitting on a volume.
pub fn parse_object_path(path: &str) -> Option<(u32, String)> {
    let mut parts = path.trim_start_matches('/').split('/');
    let sv = parts.next()?.strip_prefix("sv")?.parse::<u32>().ok()?;
    let d0 = u8::from_str_radix(parts.next()?, 16).ok()?;
    let d1 = u8::from_str_radix(parts.next()?, 16).ok()?;
    let name = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let key = decode_key(name)?;
    if key_fanout(&key) != (d0, d1) {
        return None;
    }
    Some((sv, key))
}
