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

//! In-process mock volume server for integration tests.
//!
//! Implements the volume contract the engine relies on: `GET /id`,
//! object GET/HEAD/PUT/DELETE, and JSON directory listings for paths
//! ending in `/`. Backed by an in-memory path → bytes map; stoppable to
//! simulate a dead volume.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use volkv_store::{RecordIndex, Store, StoreOptions, VolumeClient, Volumes};

pub const TEST_TIMEOUT: Duration = Duration::from_millis(500);

type Objects = Arc<Mutex<HashMap<String, Bytes>>>;

pub struct MockVolume {
    pub address: String,
    objects: Objects,
    server: JoinHandle<()>,
}

impl MockVolume {
    pub async fn start(identity: &str) -> Self {
        Self::start_at("127.0.0.1:0", identity).await
    }

    /// Bind a specific address; used to stand up a wiped replacement
    /// volume on the port of a stopped one.
    pub async fn start_at(addr: &str, identity: &str) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let objects: Objects = Arc::new(Mutex::new(HashMap::new()));

        let identity = identity.to_string();
        let served = objects.clone();
        let server = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let served = served.clone();
                let identity = identity.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let served = served.clone();
                        let identity = identity.clone();
                        async move { Ok::<_, std::convert::Infallible>(route(req, &identity, &served).await) }
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(socket), service)
                        .await;
                });
            }
        });

        Self {
            address,
            objects,
            server,
        }
    }

    /// Kill the server, simulating a dead volume. Stored objects remain
    /// inspectable, and the port is released before returning so a
    /// replacement volume can bind it.
    pub async fn stop(&self) {
        self.server.abort();
        while !self.server.is_finished() {
            tokio::task::yield_now().await;
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn insert(&self, path: &str, body: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), Bytes::copy_from_slice(body));
    }

    pub fn remove(&self, path: &str) {
        self.objects.lock().unwrap().remove(path);
    }

    pub fn clear(&self) {
        self.objects.lock().unwrap().clear();
    }
}

impl Drop for MockVolume {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn route(req: Request<Incoming>, identity: &str, objects: &Objects) -> Response<Full<Bytes>> {
    let path = req.uri().path().to_string();
    match *req.method() {
        Method::GET if path == "/id" => text(StatusCode::OK, identity),
        Method::HEAD => {
            if path == "/" || objects.lock().unwrap().contains_key(&path) {
                empty(StatusCode::OK)
            } else {
                empty(StatusCode::NOT_FOUND)
            }
        }
        Method::GET if path.ends_with('/') => listing(&path, objects),
        Method::GET => match objects.lock().unwrap().get(&path) {
            Some(body) => Response::new(Full::new(body.clone())),
            None => empty(StatusCode::NOT_FOUND),
        },
        Method::PUT => {
            let body = req.into_body().collect().await.unwrap().to_bytes();
            objects.lock().unwrap().insert(path, body);
            empty(StatusCode::CREATED)
        }
        Method::DELETE => {
            if objects.lock().unwrap().remove(&path).is_some() {
                empty(StatusCode::NO_CONTENT)
            } else {
                empty(StatusCode::NOT_FOUND)
            }
        }
        _ => empty(StatusCode::METHOD_NOT_ALLOWED),
    }
}

/// nginx-autoindex-style JSON listing of the entries directly under `dir`.
fn listing(dir: &str, objects: &Objects) -> Response<Full<Bytes>> {
    let mut entries: BTreeMap<String, &'static str> = BTreeMap::new();
    for path in objects.lock().unwrap().keys() {
        if let Some(rest) = path.strip_prefix(dir) {
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((child, _)) => entries.insert(child.to_string(), "directory"),
                None => entries.insert(rest.to_string(), "file"),
            };
        }
    }
    let body: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|(name, kind)| serde_json::json!({"name": name, "type": kind}))
        .collect();
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(&body).unwrap())))
        .unwrap()
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body.to_owned())))
        .unwrap()
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder().status(status).body(Full::new(Bytes::new())).unwrap()
}

pub fn default_opts(replicas: usize) -> StoreOptions {
    StoreOptions {
        replicas,
        subvolumes: 4,
        protect: false,
        md5sum: true,
        fallback: None,
    }
}

/// Probe `volumes` and assemble a store over an index at `dir`.
pub async fn probe_store(volumes: &[&MockVolume], dir: &Path, opts: StoreOptions) -> Store {
    let addresses: Vec<String> = volumes.iter().map(|v| v.address.clone()).collect();
    let client = VolumeClient::new(TEST_TIMEOUT).unwrap();
    let registry = Volumes::probe(&addresses, &client).await.unwrap();
    Store::new(RecordIndex::open(dir).unwrap(), registry, client, opts)
}

/// Total physical copies of `key` across `volumes`, regardless of what
/// the index believes.
pub fn physical_copies(volumes: &[&MockVolume], key: &str) -> usize {
    let suffix = format!("/{}", volkv_store::record::encode_key(key));
    volumes
        .iter()
        .map(|v| v.paths().iter().filter(|p| p.ends_with(&suffix)).count())
        .sum()
}
