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

//! Client operation orchestration: write, read, delete and unlink.
//!
//! Writes and deletes run under the per-key lock; reads do not (a reader
//! observes pre- or post-write state, never a torn record). All replica
//! I/O fans out concurrently and joins on per-replica outcomes.

use crate::client::VolumeClient;
use crate::error::{Error, Result};
use crate::index::RecordIndex;
use crate::placement::PlacementEngine;
use crate::record::{Record, RecordState, content_md5, verify_checksum};
use crate::volume::Volumes;
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use volkv_lock::KeyLockManager;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Target number of distinct volumes per object.
    pub replicas: usize,
    /// Logical disks per volume server.
    pub subvolumes: u32,
    /// Protected deletes: soft-delete first, physical removal on unlink.
    pub protect: bool,
    /// Compute and verify content MD5 checksums.
    pub md5sum: bool,
    /// Server consulted on a full read miss, for staged migrations.
    pub fallback: Option<String>,
}

/// A successful read: the payload and the stored checksum, if any.
#[derive(Debug)]
pub struct GetOutcome {
    pub body: Bytes,
    pub checksum: Option<String>,
}

pub struct Store {
    index: RecordIndex,
    volumes: Volumes,
    client: VolumeClient,
    locks: Arc<KeyLockManager>,
    placement: PlacementEngine,
    opts: StoreOptions,
}

impl Store {
    pub fn new(index: RecordIndex, volumes: Volumes, client: VolumeClient, opts: StoreOptions) -> Self {
        let placement = PlacementEngine::new(opts.subvolumes);
        Self {
            index,
            volumes,
            client,
            locks: Arc::new(KeyLockManager::new()),
            placement,
            opts,
        }
    }

    pub fn index(&self) -> &RecordIndex {
        &self.index
    }

    pub fn volumes(&self) -> &Volumes {
        &self.volumes
    }

    pub fn client(&self) -> &VolumeClient {
        &self.client
    }

    pub fn options(&self) -> &StoreOptions {
        &self.opts
    }

    /// The per-key lock table. Callers queuing retries above the engine
    /// can use it to observe contention.
    pub fn locks(&self) -> &Arc<KeyLockManager> {
        &self.locks
    }

    pub(crate) fn placement(&self) -> &PlacementEngine {
        &self.placement
    }

    /// Store `value` under `key` on up to `replicas` healthy volumes.
    ///
    /// Succeeds when at least one replica stored the payload; fewer
    /// stored locations than the configured factor is a degraded write,
    /// recorded as such. With zero successes the index is left untouched.
    #[instrument(skip(self, value), fields(len = value.len()))]
    pub async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        let _guard = self.locks.try_lock(key).ok_or(Error::LockContention)?;

        let previous = self.index.get(key)?;
        let healthy = self.volumes.healthy(&self.client).await;
        let targets = self.placement.select(self.opts.replicas, &healthy);
        if targets.is_empty() {
            return Err(Error::WriteFailure);
        }

        let stores = targets.iter().map(|loc| {
            let url = loc.object_url(key);
            let body = value.clone();
            async move { self.client.put(&url, body).await }
        });
        let outcomes = join_all(stores).await;

        let mut stored = Vec::new();
        for (loc, outcome) in targets.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => stored.push(loc),
                Err(err) => warn!(replica = %loc, %err, "replica store failed"),
            }
        }
        if stored.is_empty() {
            return Err(Error::WriteFailure);
        }
        if stored.len() < self.opts.replicas {
            warn!(key, stored = stored.len(), wanted = self.opts.replicas, "write is under-replicated");
        }

        let record = Record {
            locations: stored,
            state: RecordState::Hard,
            checksum: self.opts.md5sum.then(|| content_md5(&value)),
        };
        self.index.put(key, &record)?;

        // Replaced replicas of an overwritten record are removed after the
        // index update so rebuild cannot resurrect stale content. Failures
        // leave unreferenced copies for maintenance.
        let replaced: Vec<_> = previous
            .locations
            .into_iter()
            .filter(|loc| !record.locations.contains(loc))
            .collect();
        if !replaced.is_empty() {
            let deletes = replaced.iter().map(|loc| {
                let url = loc.object_url(key);
                async move { self.client.delete(&url).await }
            });
            for (loc, outcome) in replaced.iter().zip(join_all(deletes).await) {
                if let Err(err) = outcome {
                    warn!(replica = %loc, %err, "stale replica cleanup failed");
                }
            }
        }
        Ok(())
    }

    /// Read `key`, walking the stored locations in order and skipping
    /// failed replicas. Consults the fallback on a full miss.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<GetOutcome> {
        let record = self.index.get(key)?;
        if record.state == RecordState::Soft {
            // Deletion hides the key even when stale copies survive
            // upstream; the fallback is not consulted.
            return Err(Error::NotFound);
        }
        if !record.exists() {
            return self.get_fallback(key).await;
        }

        for loc in &record.locations {
            match self.client.get(&loc.object_url(key)).await {
                Ok(body) => {
                    if self.opts.md5sum {
                        if let Some(expected) = record.checksum.as_deref() {
                            if let Err(err) = verify_checksum(expected, &body) {
                                warn!(replica = %loc, %err, "trying next replica");
                                continue;
                            }
                        }
                    }
                    return Ok(GetOutcome {
                        body,
                        checksum: record.checksum.clone(),
                    });
                }
                Err(err) => debug!(replica = %loc, %err, "replica read failed, trying next"),
            }
        }
        self.get_fallback(key).await
    }

    /// Existence check mirroring [`Store::get`] with HEAD requests.
    /// Returns the stored checksum when the key is readable.
    #[instrument(skip(self))]
    pub async fn stat(&self, key: &str) -> Result<Option<String>> {
        let record = self.index.get(key)?;
        if record.state == RecordState::Soft {
            return Err(Error::NotFound);
        }
        if !record.exists() {
            return self.stat_fallback(key).await;
        }
        for loc in &record.locations {
            if self.client.head(&loc.object_url(key)).await {
                return Ok(record.checksum.clone());
            }
        }
        self.stat_fallback(key).await
    }

    /// Delete `key`. Unprotected: physical removal and index drop in one
    /// step. Protected: transition to soft, hiding the key from readers
    /// while copies persist for a later unlink.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.locks.try_lock(key).ok_or(Error::LockContention)?;

        let mut record = self.index.get(key)?;
        if !record.exists() {
            return Err(Error::NotFound);
        }

        if self.opts.protect {
            record.state = RecordState::Soft;
            self.index.put(key, &record)?;
            return Ok(());
        }

        let deletes = record.locations.iter().map(|loc| {
            let url = loc.object_url(key);
            async move { self.client.delete(&url).await }
        });
        for (loc, outcome) in record.locations.iter().zip(join_all(deletes).await) {
            if let Err(err) = outcome {
                warn!(replica = %loc, %err, "replica delete failed");
            }
        }
        // The record goes regardless of individual volume outcomes;
        // stragglers become unreferenced copies.
        self.index.remove(key)?;
        Ok(())
    }

    /// Physically remove a soft-deleted key. A record that is absent or
    /// not soft is a no-op success, making unlink idempotent. Locations
    /// whose deletion failed stay on the record so a re-run converges.
    #[instrument(skip(self))]
    pub async fn unlink(&self, key: &str) -> Result<()> {
        let _guard = self.locks.try_lock(key).ok_or(Error::LockContention)?;

        let mut record = self.index.get(key)?;
        if !record.exists() || record.state != RecordState::Soft {
            return Ok(());
        }

        let deletes = record.locations.iter().map(|loc| {
            let url = loc.object_url(key);
            async move { self.client.delete(&url).await }
        });
        let outcomes = join_all(deletes).await;

        let mut remaining = Vec::new();
        for (loc, outcome) in record.locations.iter().zip(outcomes) {
            if let Err(err) = outcome {
                warn!(replica = %loc, %err, "unlink delete failed");
                remaining.push(loc.clone());
            }
        }

        if remaining.is_empty() {
            self.index.remove(key)?;
            return Ok(());
        }
        let held = remaining.len();
        record.locations = remaining;
        self.index.put(key, &record)?;
        Err(Error::UnlinkIncomplete(held))
    }

    async fn get_fallback(&self, key: &str) -> Result<GetOutcome> {
        let Some(fallback) = &self.opts.fallback else {
            return Err(Error::NotFound);
        };
        let body = self
            .client
            .get(&format!("http://{fallback}/{key}"))
            .await
            .map_err(|err| {
                debug!(%err, "fallback read failed");
                Error::NotFound
            })?;
        // Fallback responses are returned as-is and never cached locally.
        Ok(GetOutcome { body, checksum: None })
    }

    async fn stat_fallback(&self, key: &str) -> Result<Option<String>> {
        let Some(fallback) = &self.opts.fallback else {
            return Err(Error::NotFound);
        };
        if self.client.head(&format!("http://{fallback}/{key}")).await {
            Ok(None)
        } else {
            Err(Error::NotFound)
        }
    }
}
