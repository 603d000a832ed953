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

//! HTTP client for volume servers.
//!
//! Every call is bounded by the configured volume timeout, applied per
//! request; a slow or dead volume costs at most one timeout period. There
//! is no circuit breaker: each operation re-evaluates a volume on its own.

use crate::error::{Error, Result};
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VolumeClient {
    http: reqwest::Client,
    timeout: Duration,
}

/// One entry of a volume's JSON directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == "directory"
    }
}

impl VolumeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Startup probe: the volume's self-reported identity.
    pub async fn probe_id(&self, address: &str) -> Result<String> {
        let body = self
            .http
            .get(format!("http://{address}/id"))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let identity = body.trim().to_owned();
        if identity.is_empty() {
            return Err(Error::other(format!("volume {address} replied with an empty identity")));
        }
        Ok(identity)
    }

    /// Bounded-timeout liveness check. Any HTTP response counts as alive;
    /// only a transport failure or timeout marks the volume down.
    pub async fn is_healthy(&self, address: &str) -> bool {
        self.http.head(format!("http://{address}/")).send().await.is_ok()
    }

    pub async fn get(&self, url: &str) -> Result<Bytes> {
        let resp = self.http.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound);
        }
        Ok(resp.error_for_status()?.bytes().await?)
    }

    pub async fn head(&self, url: &str) -> bool {
        matches!(self.http.head(url).send().await, Ok(resp) if resp.status().is_success())
    }

    pub async fn put(&self, url: &str, body: Bytes) -> Result<()> {
        self.http.put(url).body(body).send().await?.error_for_status()?;
        Ok(())
    }

    /// Physical removal. A 404 counts as already gone.
    pub async fn delete(&self, url: &str) -> Result<()> {
        let resp = self.http.delete(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        resp.error_for_status()?;
        Ok(())
    }

    /// JSON listing of a volume directory; `dir` is an absolute path
    /// ending in `/`.
    pub async fn list(&self, address: &str, dir: &str) -> Result<Vec<DirEntry>> {
        let resp = self
            .http
            .get(format!("http://{address}{dir}"))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}
