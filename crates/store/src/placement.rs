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

//! Replica placement: randomized selection of distinct healthy volumes,
//! with an independently randomized subvolume per choice.

use crate::record::Location;
use crate::volume::VolumeInfo;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Chooses target replicas for a write.
///
/// Randomization spreads load and avoids hot-spotting. The RNG belongs to
/// the engine instance so tests can seed it for deterministic selection.
pub struct PlacementEngine {
    subvolumes: u32,
    rng: Mutex<StdRng>,
}

impl PlacementEngine {
    pub fn new(subvolumes: u32) -> Self {
        Self {
            subvolumes: subvolumes.max(1),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(subvolumes: u32, seed: u64) -> Self {
        Self {
            subvolumes: subvolumes.max(1),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Select up to `count` replica targets among `healthy`, never the
    /// same volume twice. Returns fewer than `count` when fewer healthy
    /// volumes exist; the caller records the write as under-replicated
    /// instead of failing it.
    pub fn select(&self, count: usize, healthy: &[&VolumeInfo]) -> Vec<Location> {
        let mut rng = self.rng.lock();
        let mut indexes: Vec<usize> = (0..healthy.len()).collect();
        indexes.shuffle(&mut *rng);
        indexes.truncate(count);
        indexes
            .into_iter()
            .map(|i| Location::new(healthy[i].address.clone(), rng.gen_range(0..self.subvolumes)))
            .collect()
    }
}
