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

//! The volume registry: the static, process-lifetime set of volume
//! servers, identity-probed once at startup and read-only afterwards.

use crate::client::VolumeClient;
use crate::error::{Error, Result};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub address: String,
    /// Server-reported, opaque. A changed identity marks a wiped or
    /// replaced volume whose old record references are stale.
    pub identity: String,
}

#[derive(Debug, Default, Clone)]
pub struct Volumes(Vec<VolumeInfo>);

impl AsRef<Vec<VolumeInfo>> for Volumes {
    fn as_ref(&self) -> &Vec<VolumeInfo> {
        &self.0
    }
}

impl Volumes {
    /// Probe every configured address and build the registry. Any probe
    /// failure is fatal: the proxy cannot safely start with an unverified
    /// volume set.
    pub async fn probe(addresses: &[String], client: &VolumeClient) -> Result<Self> {
        if addresses.is_empty() {
            return Err(Error::Config("no volumes configured".to_string()));
        }

        let mut seen = HashSet::with_capacity(addresses.len());
        for address in addresses {
            if !seen.insert(address.as_str()) {
                return Err(Error::Config(format!("duplicate volume {address}")));
            }
        }

        let mut volumes = Vec::with_capacity(addresses.len());
        for address in addresses {
            let identity = client
                .probe_id(address)
                .await
                .map_err(|err| Error::Config(format!("probe {address} failed: {err}")))?;
            info!(volume = %address, %identity, "volume probe finished");
            volumes.push(VolumeInfo {
                address: address.clone(),
                identity,
            });
        }
        Ok(Self(volumes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VolumeInfo> {
        self.0.iter()
    }

    pub fn get(&self, address: &str) -> Option<&VolumeInfo> {
        self.0.iter().find(|v| v.address == address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.get(address).is_some()
    }

    /// The subset of volumes passing a liveness check right now, probed
    /// concurrently. Health is per-operation; nothing is cached.
    pub async fn healthy(&self, client: &VolumeClient) -> Vec<&VolumeInfo> {
        let checks = self.0.iter().map(|v| client.is_healthy(&v.address));
        let results = join_all(checks).await;
        self.0
            .iter()
            .zip(results)
            .filter_map(|(volume, alive)| if alive { Some(volume) } else { None })
            .collect()
    }

    pub fn identities(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .map(|v| (v.address.clone(), v.identity.clone()))
            .collect()
    }
}
