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

pub type Result<T> = core::result::Result<T, Error>;

/// Operation-level error taxonomy.
///
/// Replica-level failures are swallowed and aggregated inside the engine;
/// only these outcomes cross the system boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fatal misconfiguration, prevents startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Another operation currently owns this key. Retry, don't wait.
    #[error("operation in progress on this key")]
    LockContention,

    /// Miss, soft-deleted, or all replicas and fallback exhausted.
    #[error("not found")]
    NotFound,

    /// Every target replica rejected the write; the index is unchanged.
    #[error("write failed on every replica")]
    WriteFailure,

    /// A single replica failed; aggregated at the operation boundary.
    #[error("replica failure: {0}")]
    ReplicaFailure(String),

    /// Retrieved payload does not match the stored checksum.
    #[error("checksum mismatch, expected {expected} got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Some replicas still hold data after an unlink; the record stays soft.
    #[error("unlink incomplete, {0} replicas still hold data")]
    UnlinkIncomplete(usize),

    #[error("index error: {0}")]
    Index(#[from] rocksdb::Error),

    #[error("volume request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("record decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("record encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}
