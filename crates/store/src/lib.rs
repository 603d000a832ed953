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

//! Placement, consistency and recovery engine for volkv.
//!
//! The engine keeps a locally-owned metadata index consistent with object
//! data replicated across independent, individually unreliable HTTP volume
//! servers. Client operations go through [`Store`]; the maintenance
//! protocols live in [`rebuild`] and [`rebalance`] as additional `Store`
//! methods.

pub mod client;
pub mod error;
pub mod index;
pub mod placement;
pub mod rebalance;
pub mod rebuild;
pub mod record;
pub mod store;
pub mod volume;

pub use client::VolumeClient;
pub use error::{Error, Result};
pub use index::RecordIndex;
pub use placement::PlacementEngine;
pub use rebalance::RebalanceSummary;
pub use rebuild::RebuildSummary;
pub use record::{Location, Record, RecordState};
pub use store::{GetOutcome, Store, StoreOptions};
pub use volume::{VolumeInfo, Volumes};
