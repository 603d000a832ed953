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

//! Durable metadata index over rocksdb.
//!
//! Records live in the default column family keyed by the raw object key;
//! the `meta` column family holds engine bookkeeping, currently the
//! volume-identity snapshot taken at the end of each maintenance pass.

use crate::error::{Error, Result};
use crate::record::Record;
use rocksdb::{DB, IteratorMode, Options};
use std::collections::HashMap;
use std::path::Path;

const META_CF: &str = "meta";
const IDENTITIES_KEY: &[u8] = b"volume_identities";

pub struct RecordIndex {
    db: DB,
}

impl RecordIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let db = DB::open_cf(&opts, path, [META_CF])?;
        Ok(Self { db })
    }

    /// Fetch the record for `key`, defaulting to the zero-location miss
    /// record when absent.
    pub fn get(&self, key: &str) -> Result<Record> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Record::decode(&data),
            None => Ok(Record::default()),
        }
    }

    /// Persist `record` under `key`. A single atomic put; readers never
    /// observe a torn record.
    pub fn put(&self, key: &str, record: &Record) -> Result<()> {
        self.db.put(key.as_bytes(), record.encode()?)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.db.delete(key.as_bytes())?;
        Ok(())
    }

    /// Snapshot of every key currently in the index, in key order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    /// Address → identity map as of the last completed maintenance pass.
    pub fn load_identities(&self) -> Result<HashMap<String, String>> {
        let cf = self.meta_cf()?;
        match self.db.get_cf(cf, IDENTITIES_KEY)? {
            Some(data) => Ok(rmp_serde::from_slice(&data)?),
            None => Ok(HashMap::new()),
        }
    }

    pub fn store_identities(&self, identities: &HashMap<String, String>) -> Result<()> {
        let cf = self.meta_cf()?;
        self.db.put_cf(cf, IDENTITIES_KEY, rmp_serde::to_vec(identities)?)?;
        Ok(())
    }

    fn meta_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(META_CF)
            .ok_or_else(|| Error::other("meta column family missing"))
    }
}
