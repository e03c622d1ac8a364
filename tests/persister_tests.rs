// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Query persister tests.
//!
//! These tests verify that:
//! 1. Entries survive a restart and expire after `max_age`
//! 2. Changing the buster invalidates everything persisted before
//! 3. Storage failures degrade to memory-only without surfacing errors

use chrono::Utc;
use gymdesk::cache::{FileStore, Lookup, PersistedEntry, QueryKey, QueryPersister};
use gymdesk::config::CacheConfig;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn cache_config(dir: &Path, buster: &str) -> CacheConfig {
    CacheConfig {
        dir: dir.to_path_buf(),
        buster_version: buster.to_string(),
        max_age: Duration::from_secs(3600),
        stale_time: Duration::from_secs(60),
        ..CacheConfig::default()
    }
}

fn members_key() -> QueryKey {
    QueryKey::new("members").scoped("u1").with_param("page", "1")
}

#[tokio::test]
async fn test_entries_survive_restart() {
    let dir = tempdir().unwrap();

    let persister = QueryPersister::open(cache_config(dir.path(), "v1")).await;
    persister.set(&members_key(), json!(["ana", "bo"])).await;
    drop(persister);

    let reopened = QueryPersister::open(cache_config(dir.path(), "v1")).await;
    assert_eq!(reopened.memory_len(), 0);

    match reopened.get(&members_key()).await {
        Lookup::Fresh(entry) => assert_eq!(entry.data, json!(["ana", "bo"])),
        other => panic!("expected fresh hit, got {other:?}"),
    }
    assert!(!reopened.is_degraded());
}

#[tokio::test]
async fn test_entry_past_max_age_is_a_miss_and_evicted() {
    let dir = tempdir().unwrap();
    let config = cache_config(dir.path(), "v1");

    let persister = QueryPersister::open(config.clone()).await;
    let old = Utc::now() - chrono::Duration::seconds(3601);
    persister
        .put(&members_key(), PersistedEntry::fetched_at(json!([1]), old))
        .await;

    assert_eq!(persister.get(&members_key()).await, Lookup::Miss);
    assert_eq!(persister.memory_len(), 0);

    // Gone from disk too.
    let reopened = QueryPersister::open(config).await;
    assert_eq!(reopened.get(&members_key()).await, Lookup::Miss);
}

#[tokio::test]
async fn test_stale_entry_is_still_served() {
    let dir = tempdir().unwrap();
    let persister = QueryPersister::open(cache_config(dir.path(), "v1")).await;

    let stamped = Utc::now() - chrono::Duration::seconds(120);
    persister
        .put(&members_key(), PersistedEntry::fetched_at(json!([1]), stamped))
        .await;

    assert!(matches!(persister.get(&members_key()).await, Lookup::Stale(_)));
    assert_eq!(
        persister.get_entry(&members_key()).await.map(|e| e.data),
        Some(json!([1]))
    );
}

#[tokio::test]
async fn test_read_your_writes() {
    let dir = tempdir().unwrap();
    let persister = QueryPersister::open(cache_config(dir.path(), "v1")).await;
    let key = members_key();

    for version in 0..20 {
        persister.set(&key, json!({ "version": version })).await;
        let entry = persister.get_entry(&key).await.unwrap();
        assert_eq!(entry.data, json!({ "version": version }));
    }
}

#[tokio::test]
async fn test_buster_change_invalidates_and_purges() {
    let dir = tempdir().unwrap();

    let persister = QueryPersister::open(cache_config(dir.path(), "v1")).await;
    persister.set(&members_key(), json!(["old"])).await;
    drop(persister);
    assert!(dir.path().join("gymdesk@v1").is_dir());

    let persister = QueryPersister::open(cache_config(dir.path(), "v2")).await;
    assert_eq!(persister.get(&members_key()).await, Lookup::Miss);
    assert!(!dir.path().join("gymdesk@v1").exists());
    assert!(dir.path().join("gymdesk@v2").is_dir());
}

#[tokio::test]
async fn test_other_namespaces_are_not_purged() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("othertool@v1")).unwrap();

    let _persister = QueryPersister::open(cache_config(dir.path(), "v2")).await;
    assert!(dir.path().join("othertool@v1").is_dir());
}

#[tokio::test]
async fn test_unusable_root_degrades_to_memory() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("not-a-directory");
    std::fs::write(&root, b"occupied").unwrap();

    let persister = QueryPersister::open(cache_config(&root, "v1")).await;
    assert!(persister.is_degraded());

    persister.set(&members_key(), json!([7])).await;
    assert!(matches!(persister.get(&members_key()).await, Lookup::Fresh(_)));
}

#[tokio::test]
async fn test_storage_lost_mid_session_degrades_once() {
    let dir = tempdir().unwrap();
    let persister = QueryPersister::open(cache_config(dir.path(), "v1")).await;
    persister.set(&members_key(), json!([1])).await;
    assert!(!persister.is_degraded());

    std::fs::remove_dir_all(dir.path().join("gymdesk@v1")).unwrap();

    let other = QueryKey::new("classes").scoped("u1");
    persister.set(&other, json!([2])).await;
    assert!(persister.is_degraded());

    // Both entries keep being served from memory.
    assert_eq!(persister.get_entry(&other).await.unwrap().data, json!([2]));
    assert_eq!(
        persister.get_entry(&members_key()).await.unwrap().data,
        json!([1])
    );

    // Further writes stay silent and in memory.
    persister.set(&other, json!([3])).await;
    assert_eq!(persister.get_entry(&other).await.unwrap().data, json!([3]));
}

#[tokio::test]
async fn test_corrupt_entry_is_discarded() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path(), "gymdesk", "v1").await.unwrap();
    let key = members_key();

    std::fs::write(
        store.dir().join(format!("{}.json", key.storage_key())),
        b"{not json",
    )
    .unwrap();

    let persister = QueryPersister::open(cache_config(dir.path(), "v1")).await;
    assert_eq!(persister.get(&key).await, Lookup::Miss);
    assert!(!persister.is_degraded());
    assert!(!store
        .dir()
        .join(format!("{}.json", key.storage_key()))
        .exists());
}

#[tokio::test]
async fn test_keys_are_scoped_per_user() {
    let dir = tempdir().unwrap();
    let persister = QueryPersister::open(cache_config(dir.path(), "v1")).await;

    persister
        .set(&QueryKey::new("members").scoped("u1"), json!(["mine"]))
        .await;

    assert_eq!(
        persister.get(&QueryKey::new("members").scoped("u2")).await,
        Lookup::Miss
    );
}

#[tokio::test]
async fn test_remove_resource_survives_restart() {
    let dir = tempdir().unwrap();
    let march = QueryKey::new("attendance").scoped("u1").with_param("month", "3");
    let all = QueryKey::new("attendance").scoped("u1");
    let theirs = QueryKey::new("attendance").scoped("u2");

    let persister = QueryPersister::open(cache_config(dir.path(), "v1")).await;
    for key in [&march, &all, &theirs, &members_key()] {
        persister.set(key, json!(["row"])).await;
    }
    persister.remove_resource("u1", "attendance").await;
    assert_eq!(persister.get(&march).await, Lookup::Miss);
    drop(persister);

    let reopened = QueryPersister::open(cache_config(dir.path(), "v1")).await;
    assert_eq!(reopened.get(&march).await, Lookup::Miss);
    assert_eq!(reopened.get(&all).await, Lookup::Miss);
    assert!(reopened.get_entry(&theirs).await.is_some());
    assert!(reopened.get_entry(&members_key()).await.is_some());
    assert!(!reopened.is_degraded());
}
