// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Two-layer query persister: an in-memory map in front of a durable
//! [`FileStore`].
//!
//! Writes land in memory before the durable layer, so a `set` followed by a
//! `get` of the same key in this process always sees the new value. If the
//! durable layer fails once, the persister runs memory-only for the rest of
//! the process lifetime and never reports the failure to callers.

use super::{FileStore, Freshness, Lookup, PersistedEntry, PersistenceError, QueryKey};
use crate::config::CacheConfig;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct QueryPersister {
    config: CacheConfig,
    memory: DashMap<QueryKey, PersistedEntry>,
    durable: Option<FileStore>,
    degraded: AtomicBool,
}

impl QueryPersister {
    /// Open the persister described by `config`.
    ///
    /// Never fails: an unusable durable store yields a memory-only persister.
    pub async fn open(config: CacheConfig) -> Self {
        match FileStore::open(&config.dir, &config.namespace, &config.buster_version).await {
            Ok(store) => Self {
                config,
                memory: DashMap::new(),
                durable: Some(store),
                degraded: AtomicBool::new(false),
            },
            Err(e) => {
                let persister = Self::memory_only(config);
                persister.degrade(&e);
                persister
            }
        }
    }

    /// Persister without a durable layer.
    pub fn memory_only(config: CacheConfig) -> Self {
        Self {
            config,
            memory: DashMap::new(),
            durable: None,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether the durable layer has been abandoned.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Classify the entry for `key`. Entries past `max_age` are evicted and
    /// reported as a miss.
    pub async fn get(&self, key: &QueryKey) -> Lookup {
        let entry = match self.memory.get(key).map(|e| e.value().clone()) {
            Some(entry) => Some(entry),
            None => self.load_durable(key).await,
        };

        let Some(entry) = entry else {
            return Lookup::Miss;
        };

        match entry.freshness(Utc::now(), self.config.max_age, self.config.stale_time) {
            Freshness::Fresh => Lookup::Fresh(entry),
            Freshness::Stale => Lookup::Stale(entry),
            Freshness::Expired => {
                tracing::debug!(resource = %key.resource, "Evicting cache entry past max age");
                self.evict_if_unchanged(key, &entry).await;
                Lookup::Miss
            }
        }
    }

    /// Entry for `key` if it is within `max_age`, fresh or stale.
    pub async fn get_entry(&self, key: &QueryKey) -> Option<PersistedEntry> {
        match self.get(key).await {
            Lookup::Fresh(entry) | Lookup::Stale(entry) => Some(entry),
            Lookup::Miss => None,
        }
    }

    /// Store `data` for `key`, stamped now.
    pub async fn set(&self, key: &QueryKey, data: Value) -> PersistedEntry {
        let entry = PersistedEntry::new(data);
        self.put(key, entry.clone()).await;
        entry
    }

    /// Store an entry with an explicit timestamp.
    pub async fn put(&self, key: &QueryKey, entry: PersistedEntry) {
        self.memory.insert(key.clone(), entry.clone());

        if let Some(store) = self.active_store() {
            if let Err(e) = store.write(key, &entry).await {
                self.degrade(&e);
            }
        }
    }

    /// Evict `key` from both layers.
    pub async fn remove(&self, key: &QueryKey) {
        self.memory.remove(key);

        if let Some(store) = self.active_store() {
            if let Err(e) = store.remove(key).await {
                self.degrade(&e);
            }
        }
    }

    /// Evict every entry of `resource` owned by `scope`, whatever its
    /// parameters, from both layers.
    pub async fn remove_resource(&self, scope: &str, resource: &str) {
        let matches = |key: &QueryKey| key.scope == scope && key.resource == resource;
        self.memory.retain(|key, _| !matches(key));

        if let Some(store) = self.active_store() {
            match store.remove_where(matches).await {
                Ok(removed) => {
                    tracing::debug!(scope, resource, removed, "Evicted persisted resource entries")
                }
                Err(e) => self.degrade(&e),
            }
        }
    }

    /// Number of entries held in memory.
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    async fn load_durable(&self, key: &QueryKey) -> Option<PersistedEntry> {
        let store = self.active_store()?;
        match store.read(key).await {
            Ok(Some(entry)) => {
                // A concurrent `set` may have landed while we were reading;
                // never let the older durable copy replace it.
                let current = self
                    .memory
                    .entry(key.clone())
                    .or_insert(entry)
                    .value()
                    .clone();
                Some(current)
            }
            Ok(None) => None,
            Err(e) => {
                self.degrade(&e);
                None
            }
        }
    }

    async fn evict_if_unchanged(&self, key: &QueryKey, expired: &PersistedEntry) {
        self.memory
            .remove_if(key, |_, current| current.fetched_at == expired.fetched_at);

        // A newer entry written meanwhile stays, in memory and on disk.
        if !self.memory.contains_key(key) {
            if let Some(store) = self.active_store() {
                if let Err(e) = store.remove(key).await {
                    self.degrade(&e);
                }
            }
        }
    }

    fn active_store(&self) -> Option<&FileStore> {
        if self.is_degraded() {
            return None;
        }
        self.durable.as_ref()
    }

    /// Switch to memory-only mode, logging the first failure only.
    fn degrade(&self, err: &PersistenceError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                error = %err,
                dir = %self.config.dir.display(),
                "Durable query cache unavailable; continuing with in-memory cache only"
            );
        }
    }
}
