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

//! Index rebuild: reconstruct the metadata index from the ground truth
//! stored on volumes.
//!
//! The reconstruction is an idempotent, order-independent fold over every
//! (volume, key) observation, freely restartable after a crash. It takes
//! no per-key locks: rebuild is a maintenance-mode operation and the
//! proxy must not serve write/delete traffic while it runs.

use crate::client::VolumeClient;
use crate::error::Result;
use crate::record::{Location, Record, RecordState, content_md5, parse_object_path};
use crate::store::Store;
use crate::volume::VolumeInfo;
use futures::future::join_all;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

#[derive(Debug, Default)]
pub struct RebuildSummary {
    /// Keys recovered into the rebuilt index.
    pub keys: usize,
    /// Stale index entries dropped because no volume holds a copy.
    pub dropped: usize,
}

impl Store {
    /// Reconstruct the index by enumerating objects actually present on
    /// every volume.
    ///
    /// Keys never referenced by the old index are recovered; keys the old
    /// index references but no volume holds are dropped. A previously
    /// soft-deleted key whose copies survive stays soft, so a pending
    /// unlink is not resurrected. When checksumming is enabled each copy
    /// is fetched and hashed, and only copies agreeing with the majority
    /// checksum are trusted.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<RebuildSummary> {
        let walks = self.volumes().iter().map(|v| walk_volume(self.client(), v));
        let walked = join_all(walks).await;

        let mut complete = true;
        let mut merged: BTreeMap<String, Vec<Location>> = BTreeMap::new();
        for (volume, result) in self.volumes().iter().zip(walked) {
            match result {
                Ok(observations) => {
                    for (key, location) in observations {
                        merge_observation(&mut merged, key, location);
                    }
                }
                Err(err) => {
                    complete = false;
                    warn!(volume = %volume.address, %err, "volume listing failed, its copies will not be recovered");
                }
            }
        }

        let mut summary = RebuildSummary::default();

        // Dropping index entries is only safe against a complete scan; a
        // failed listing would otherwise discard keys whose copies all
        // live on the unlisted volume.
        if complete {
            for key in self.index().keys()? {
                if !merged.contains_key(&key) {
                    self.index().remove(&key)?;
                    summary.dropped += 1;
                }
            }
        } else {
            warn!("scan incomplete, stale index entries are kept");
        }

        for (key, locations) in merged {
            let prior = self.index().get(&key)?;
            let (locations, checksum) = if self.options().md5sum {
                self.elect_checksum(&key, locations).await
            } else {
                (locations, None)
            };
            if locations.is_empty() {
                warn!(%key, "no trusted copy survived verification");
                continue;
            }
            let state = if prior.exists() && prior.state == RecordState::Soft {
                RecordState::Soft
            } else {
                RecordState::Hard
            };
            self.index().put(
                &key,
                &Record {
                    locations,
                    state,
                    checksum,
                },
            )?;
            summary.keys += 1;
        }

        if complete {
            self.index().store_identities(&self.volumes().identities())?;
        }
        info!(keys = summary.keys, dropped = summary.dropped, "rebuild finished");
        Ok(summary)
    }

    /// Fetch and hash every copy of `key`; the majority checksum wins and
    /// copies disagreeing with it are dropped. With nothing verifiable the
    /// observed copies are kept unverified.
    async fn elect_checksum(&self, key: &str, locations: Vec<Location>) -> (Vec<Location>, Option<String>) {
        let fetches = locations.iter().map(|loc| {
            let url = loc.object_url(key);
            async move { self.client().get(&url).await }
        });
        let bodies = join_all(fetches).await;

        let checksums: Vec<Option<String>> = locations
            .iter()
            .zip(bodies)
            .map(|(loc, body)| match body {
                Ok(body) => Some(content_md5(&body)),
                Err(err) => {
                    warn!(key, replica = %loc, %err, "copy unreadable during verification");
                    None
                }
            })
            .collect();

        match majority_checksum(&checksums) {
            Some(winner) => {
                let trusted: Vec<Location> = locations
                    .into_iter()
                    .zip(&checksums)
                    .filter(|(_, sum)| sum.as_deref() == Some(winner.as_str()))
                    .map(|(loc, _)| loc)
                    .collect();
                (trusted, Some(winner))
            }
            None => {
                warn!(key, "no copy verifiable, keeping observations unverified");
                (locations, None)
            }
        }
    }
}

/// Fold one (volume, key) observation into the reconstruction, ignoring
/// duplicate sightings of the same location.
fn merge_observation(merged: &mut BTreeMap<String, Vec<Location>>, key: String, location: Location) {
    let locations = merged.entry(key).or_default();
    if !locations.contains(&location) {
        locations.push(location);
    }
}

/// The most frequent checksum among the readable copies; ties break to
/// the lexicographically smallest so repeated rebuilds agree.
fn majority_checksum(checksums: &[Option<String>]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for sum in checksums.iter().flatten() {
        *counts.entry(sum.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(sum, _)| sum.to_owned())
}

/// Recursively walk a volume's directory listing, decoding object paths
/// back into keys. Foreign files are skipped with a warning.
async fn walk_volume(client: &VolumeClient, volume: &VolumeInfo) -> Result<Vec<(String, Location)>> {
    let mut found = Vec::new();
    let mut pending = vec!["/".to_string()];
    while let Some(dir) = pending.pop() {
        let mut entries = client.list(&volume.address, &dir).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        for entry in entries {
            if entry.is_dir() {
                pending.push(format!("{dir}{}/", entry.name));
            } else {
                let path = format!("{dir}{}", entry.name);
                match parse_object_path(&path) {
                    Some((subvolume, key)) => {
                        found.push((key, Location::new(volume.address.clone(), subvolume)));
                    }
                    None => warn!(volume = %volume.address, %path, "skipping foreign object"),
                }
            }
        }
    }
    Ok(found)
}
