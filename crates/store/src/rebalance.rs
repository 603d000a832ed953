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

//! Rebalance: restore replication and distribution after volumes are
//! added, removed or replaced.
//!
//! Each key migrates under its own lock with copy-then-update-then-cleanup
//! ordering, so an interruption leaves at worst extra unreferenced copies
//! and never fewer live copies than before. Per-key failures are logged
//! and skipped; partial progress always beats all-or-nothing.

use crate::error::{Error, Result};
use crate::record::{Location, Record, verify_checksum};
use crate::store::Store;
use crate::volume::VolumeInfo;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default)]
pub struct RebalanceSummary {
    pub examined: usize,
    pub repaired: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum KeyOutcome {
    Clean,
    Repaired,
    Skipped,
}

impl Store {
    /// Walk the index and repair every record against the current volume
    /// topology: replace stale locations (unregistered address, changed
    /// identity, missing copy), restore under-replication, trim surplus.
    #[instrument(skip(self))]
    pub async fn rebalance(&self) -> Result<RebalanceSummary> {
        let healthy = self.volumes().healthy(self.client()).await;
        let snapshot = self.index().load_identities()?;
        let keys = self.index().keys()?;

        let mut summary = RebalanceSummary {
            examined: keys.len(),
            ..Default::default()
        };
        for key in keys {
            match self.rebalance_key(&key, &healthy, &snapshot).await {
                Ok(KeyOutcome::Repaired) => summary.repaired += 1,
                Ok(KeyOutcome::Clean) => {}
                Ok(KeyOutcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    warn!(%key, %err, "rebalance failed for key, continuing");
                    summary.failed += 1;
                }
            }
        }

        self.index().store_identities(&self.volumes().identities())?;
        info!(
            examined = summary.examined,
            repaired = summary.repaired,
            skipped = summary.skipped,
            failed = summary.failed,
            "rebalance finished"
        );
        Ok(summary)
    }

    async fn rebalance_key(
        &self,
        key: &str,
        healthy: &[&VolumeInfo],
        snapshot: &HashMap<String, String>,
    ) -> Result<KeyOutcome> {
        let Some(_guard) = self.locks().try_lock(key) else {
            debug!(key, "key is busy, skipping");
            return Ok(KeyOutcome::Skipped);
        };

        // Re-read under the lock; the iteration snapshot may be stale.
        let record = self.index().get(key)?;
        if !record.exists() {
            return Ok(KeyOutcome::Clean);
        }

        let mut live = Vec::new();
        let mut stale = Vec::new();
        for loc in record.locations.iter().cloned() {
            if self.location_is_live(key, &loc, snapshot).await {
                live.push(loc);
            } else {
                stale.push(loc);
            }
        }

        if live.is_empty() {
            warn!(key, "no reachable copy, leaving record untouched");
            return Ok(KeyOutcome::Skipped);
        }

        let want = self.options().replicas;
        let mut created: Vec<Location> = Vec::new();
        if live.len() < want {
            let holding: HashSet<&str> = live.iter().map(|l| l.volume.as_str()).collect();
            let candidates: Vec<&VolumeInfo> = healthy
                .iter()
                .copied()
                .filter(|v| !holding.contains(v.address.as_str()))
                .collect();
            let targets = self.placement().select(want - live.len(), &candidates);
            if targets.is_empty() {
                debug!(key, "no candidate volumes to restore replication");
            } else {
                let body = self.fetch_copy(key, &live, record.checksum.as_deref()).await?;
                for target in targets {
                    match self.client().put(&target.object_url(key), body.clone()).await {
                        Ok(()) => created.push(target),
                        Err(err) => warn!(key, replica = %target, %err, "replica copy failed"),
                    }
                }
            }
        }

        let mut locations = live;
        locations.extend(created);
        let surplus = if locations.len() > want {
            locations.split_off(want)
        } else {
            Vec::new()
        };

        if locations == record.locations && stale.is_empty() && surplus.is_empty() {
            return Ok(KeyOutcome::Clean);
        }

        // Copy-then-update-then-cleanup: the index moves to the new
        // location set only after every new copy is durable, and old
        // copies go only after the index update.
        let updated = Record {
            locations,
            state: record.state,
            checksum: record.checksum.clone(),
        };
        self.index().put(key, &updated)?;

        for loc in stale.into_iter().chain(surplus) {
            if self.volumes().contains(&loc.volume) {
                if let Err(err) = self.client().delete(&loc.object_url(key)).await {
                    debug!(key, replica = %loc, %err, "old copy cleanup failed");
                }
            }
        }
        Ok(KeyOutcome::Repaired)
    }

    /// A stored location is live when its address is still registered,
    /// the volume's identity has not changed since the last maintenance
    /// pass, and the copy answers a HEAD probe.
    async fn location_is_live(&self, key: &str, loc: &Location, snapshot: &HashMap<String, String>) -> bool {
        let Some(volume) = self.volumes().get(&loc.volume) else {
            return false;
        };
        if let Some(old) = snapshot.get(&loc.volume) {
            if *old != volume.identity {
                return false;
            }
        }
        self.client().head(&loc.object_url(key)).await
    }

    async fn fetch_copy(&self, key: &str, sources: &[Location], checksum: Option<&str>) -> Result<Bytes> {
        for loc in sources {
            match self.client().get(&loc.object_url(key)).await {
                Ok(body) => {
                    if self.options().md5sum {
                        if let Some(expected) = checksum {
                            if let Err(err) = verify_checksum(expected, &body) {
                                warn!(key, replica = %loc, %err, "source copy corrupt, trying next");
                                continue;
                            }
                        }
                    }
                    return Ok(body);
                }
                Err(err) => debug!(key, replica = %loc, %err, "source read failed, trying next"),
            }
        }
        Err(Error::ReplicaFailure("no readable source copy".to_string()))
    }
}
