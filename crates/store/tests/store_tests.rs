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

mod common;

use bytes::Bytes;
use common::{MockVolume, default_opts, physical_copies, probe_store};
use std::collections::HashSet;
use tempfile::TempDir;
use volkv_store::record::content_md5;
use volkv_store::{Error, RecordState};

#[tokio::test]
async fn test_put_get_with_two_replicas() {
    let v1 = MockVolume::start("id-1").await;
    let v2 = MockVolume::start("id-2").await;
    let v3 = MockVolume::start("id-3").await;
    let volumes = [&v1, &v2, &v3];
    let dir = TempDir::new().unwrap();
    let store = probe_store(&volumes, dir.path(), default_opts(2)).await;

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();

    let out = store.get("k1").await.unwrap();
    assert_eq!(out.body.as_ref(), b"v1");
    assert_eq!(out.checksum.as_deref(), Some(content_md5(b"v1").as_str()));

    let record = store.index().get("k1").unwrap();
    assert_eq!(record.locations.len(), 2);
    assert_eq!(record.state, RecordState::Hard);
    let distinct: HashSet<&str> = record.locations.iter().map(|l| l.volume.as_str()).collect();
    assert_eq!(distinct.len(), 2);
    assert_eq!(physical_copies(&volumes, "k1"), 2);
}

#[tokio::test]
async fn test_degraded_write_with_one_volume_down() {
    let v1 = MockVolume::start("id-1").await;
    let v2 = MockVolume::start("id-2").await;
    let v3 = MockVolume::start("id-3").await;
    let dir = TempDir::new().unwrap();
    let store = probe_store(&[&v1, &v2, &v3], dir.path(), default_opts(3)).await;

    v3.stop().await;
    store.put("k2", Bytes::from_static(b"v2")).await.unwrap();

    let record = store.index().get("k2").unwrap();
    assert_eq!(record.locations.len(), 2);
    assert!(record.locations.iter().all(|l| l.volume != v3.address));
    assert_eq!(store.get("k2").await.unwrap().body.as_ref(), b"v2");
}

#[tokio::test]
async fn test_total_write_failure_leaves_index_unchanged() {
    let v1 = MockVolume::start("id-1").await;
    let v2 = MockVolume::start("id-2").await;
    let dir = TempDir::new().unwrap();
    let store = probe_store(&[&v1, &v2], dir.path(), default_opts(2)).await;

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();
    let before = store.index().get("k1").unwrap();

    v1.stop().await;
    v2.stop().await;
    let err = store.put("k1", Bytes::from_static(b"v2")).await.unwrap_err();
    assert!(matches!(err, Error::WriteFailure));
    assert_eq!(store.index().get("k1").unwrap(), before);

    // A fresh key fails the same way and never shows up in the index.
    let err = store.put("k9", Bytes::from_static(b"x")).await.unwrap_err();
    assert!(matches!(err, Error::WriteFailure));
    assert!(!store.index().get("k9").unwrap().exists());
}

#[tokio::test]
async fn test_read_skips_dead_replica() {
    let v1 = MockVolume::start("id-1").await;
    let v2 = MockVolume::start("id-2").await;
    let v3 = MockVolume::start("id-3").await;
    let volumes = [&v1, &v2, &v3];
    let dir = TempDir::new().unwrap();
    let store = probe_store(&volumes, dir.path(), default_opts(2)).await;

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();
    let record = store.index().get("k1").unwrap();

    // Kill the first stored replica; the read walks on to the second.
    let first = &record.locations[0].volume;
    for v in &volumes {
        if &v.address == first {
            v.stop().await;
        }
    }
    assert_eq!(store.get("k1").await.unwrap().body.as_ref(), b"v1");
}

#[tokio::test]
async fn test_checksum_mismatch_fails_over_to_next_replica() {
    let v1 = MockVolume::start("id-1").await;
    let v2 = MockVolume::start("id-2").await;
    let volumes = [&v1, &v2];
    let dir = TempDir::new().unwrap();
    let store = probe_store(&volumes, dir.path(), default_opts(2)).await;

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();
    let record = store.index().get("k1").unwrap();

    // Corrupt the copy the read would try first.
    let first = &record.locations[0];
    for v in &volumes {
        if v.address == first.volume {
            v.insert(&first.object_path("k1"), b"garbage");
        }
    }
    assert_eq!(store.get("k1").await.unwrap().body.as_ref(), b"v1");

    // With the intact replica gone, only the corrupt copy remains and
    // exhaustion surfaces as not-found.
    let second = &record.locations[1];
    for v in &volumes {
        if v.address == second.volume {
            v.stop().await;
        }
    }
    assert!(matches!(store.get("k1").await.unwrap_err(), Error::NotFound));
}

#[tokio::test]
async fn test_unprotected_delete_removes_record_and_copies() {
    let v1 = MockVolume::start("id-1").await;
    let v2 = MockVolume::start("id-2").await;
    let volumes = [&v1, &v2];
    let dir = TempDir::new().unwrap();
    let store = probe_store(&volumes, dir.path(), default_opts(2)).await;

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();
    store.delete("k1").await.unwrap();

    assert!(matches!(store.get("k1").await.unwrap_err(), Error::NotFound));
    assert_eq!(physical_copies(&volumes, "k1"), 0);

    // The loser of two racing deletes sees a benign not-found.
    assert!(matches!(store.delete("k1").await.unwrap_err(), Error::NotFound));
}

#[tokio::test]
async fn test_protected_delete_then_unlink() {
    let v1 = MockVolume::start("id-1").await;
    let v2 = MockVolume::start("id-2").await;
    let volumes = [&v1, &v2];
    let dir = TempDir::new().unwrap();
    let mut opts = default_opts(2);
    opts.protect = true;
    let store = probe_store(&volumes, dir.path(), opts).await;

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();
    store.delete("k1").await.unwrap();

    // Hidden from readers while physical copies survive.
    assert!(matches!(store.get("k1").await.unwrap_err(), Error::NotFound));
    assert!(matches!(store.stat("k1").await.unwrap_err(), Error::NotFound));
    assert_eq!(physical_copies(&volumes, "k1"), 2);
    assert_eq!(store.index().get("k1").unwrap().state, RecordState::Soft);

    // A repeated protected delete is a no-op success.
    store.delete("k1").await.unwrap();

    store.unlink("k1").await.unwrap();
    assert!(!store.index().get("k1").unwrap().exists());
    assert_eq!(physical_copies(&volumes, "k1"), 0);
    assert!(matches!(store.get("k1").await.unwrap_err(), Error::NotFound));

    // Unlink is idempotent.
    store.unlink("k1").await.unwrap();
}

#[tokio::test]
async fn test_unlink_on_hard_record_is_a_noop() {
    let v1 = MockVolume::start("id-1").await;
    let dir = TempDir::new().unwrap();
    let store = probe_store(&[&v1], dir.path(), default_opts(1)).await;

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();
    store.unlink("k1").await.unwrap();

    // The record was not soft, so nothing was removed.
    assert_eq!(store.get("k1").await.unwrap().body.as_ref(), b"v1");
}

#[tokio::test]
async fn test_locked_key_rejects_conflicting_operations() {
    let v1 = MockVolume::start("id-1").await;
    let dir = TempDir::new().unwrap();
    let store = probe_store(&[&v1], dir.path(), default_opts(1)).await;

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();

    let guard = store.locks().try_lock("k1").unwrap();
    assert!(matches!(
        store.put("k1", Bytes::from_static(b"v2")).await.unwrap_err(),
        Error::LockContention
    ));
    assert!(matches!(store.delete("k1").await.unwrap_err(), Error::LockContention));
    // Reads take no lock.
    assert_eq!(store.get("k1").await.unwrap().body.as_ref(), b"v1");
    drop(guard);

    store.delete("k1").await.unwrap();
}

#[tokio::test]
async fn test_overwrite_replaces_value_and_cleans_old_copies() {
    let v1 = MockVolume::start("id-1").await;
    let v2 = MockVolume::start("id-2").await;
    let v3 = MockVolume::start("id-3").await;
    let volumes = [&v1, &v2, &v3];
    let dir = TempDir::new().unwrap();
    let store = probe_store(&volumes, dir.path(), default_opts(2)).await;

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();
    store.put("k1", Bytes::from_static(b"v2")).await.unwrap();

    let record = store.index().get("k1").unwrap();
    assert_eq!(record.locations.len(), 2);
    assert_eq!(record.checksum.as_deref(), Some(content_md5(b"v2").as_str()));
    assert_eq!(store.get("k1").await.unwrap().body.as_ref(), b"v2");
    // No stray copies survive on volumes the new write skipped.
    assert_eq!(physical_copies(&volumes, "k1"), 2);
}

#[tokio::test]
async fn test_fallback_serves_full_miss_but_not_soft_deletes() {
    let v1 = MockVolume::start("id-1").await;
    let fallback = MockVolume::start("id-fb").await;
    fallback.insert("/k1", b"from-fallback");

    let dir = TempDir::new().unwrap();
    let mut opts = default_opts(1);
    opts.protect = true;
    opts.fallback = Some(fallback.address.clone());
    let store = probe_store(&[&v1], dir.path(), opts).await;

    // Record miss forwards to the fallback, response as-is, uncached.
    let out = store.get("k1").await.unwrap();
    assert_eq!(out.body.as_ref(), b"from-fallback");
    assert!(out.checksum.is_none());
    assert!(!store.index().get("k1").unwrap().exists());
    assert!(store.stat("k1").await.unwrap().is_none());

    // An unknown key missing from the fallback too is a plain miss.
    assert!(matches!(store.get("nope").await.unwrap_err(), Error::NotFound));

    // A soft-deleted key stays hidden even though the fallback could
    // serve it.
    store.put("k1", Bytes::from_static(b"local")).await.unwrap();
    store.delete("k1").await.unwrap();
    assert!(matches!(store.get("k1").await.unwrap_err(), Error::NotFound));
}

#[tokio::test]
async fn test_stat_walks_replicas() {
    let v1 = MockVolume::start("id-1").await;
    let v2 = MockVolume::start("id-2").await;
    let volumes = [&v1, &v2];
    let dir = TempDir::new().unwrap();
    let store = probe_store(&volumes, dir.path(), default_opts(2)).await;

    assert!(matches!(store.stat("k1").await.unwrap_err(), Error::NotFound));

    store.put("k1", Bytes::from_static(b"v1")).await.unwrap();
    assert_eq!(
        store.stat("k1").await.unwrap().as_deref(),
        Some(content_md5(b"v1").as_str())
    );

    // Still visible while any one replica answers.
    let record = store.index().get("k1").unwrap();
    let first = &record.locations[0].volume;
    for v in &volumes {
        if &v.address == first {
            v.stop().await;
        }
    }
    assert!(store.stat("k1").await.unwrap().is_some());
}
