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

//! Per-key mutual exclusion for volkv.
//!
//! At most one logical operation may own a key at a time. Acquisition is
//! non-blocking: a caller that loses the race is rejected immediately and
//! must retry at its own pace. Ownership is process-wide, in-memory only,
//! and released on guard drop so every exit path of a critical section
//! unlocks.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Grants at most one outstanding operation per key.
///
/// A key's presence in the table means "an operation currently owns this
/// key". Entries are transient: inserted on acquire, removed on release,
/// never persisted.
#[derive(Debug, Default)]
pub struct KeyLockManager {
    keys: Mutex<HashSet<String>>,
}

impl KeyLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire `key` without blocking.
    ///
    /// Returns `None` when another operation already owns the key. The
    /// returned guard releases the key on drop.
    pub fn try_lock(self: &Arc<Self>, key: &str) -> Option<KeyLockGuard> {
        let mut keys = self.keys.lock();
        if !keys.insert(key.to_owned()) {
            return None;
        }
        Some(KeyLockGuard {
            manager: Arc::clone(self),
            key: key.to_owned(),
            released: false,
        })
    }

    /// Whether `key` is currently owned by some operation.
    pub fn is_locked(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }

    fn unlock(&self, key: &str) {
        self.keys.lock().remove(key);
    }
}

/// RAII ownership of one key.
#[derive(Debug)]
pub struct KeyLockGuard {
    manager: Arc<KeyLockManager>,
    key: String,
    released: bool,
}

impl KeyLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the key early. Safe to call more than once.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.manager.unlock(&self.key);
        self.released = true;
        true
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
