// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Query client: cache-aware backend reads with connectivity tracking.
//!
//! Handles:
//! - Fresh / stale-while-revalidating / offline serving of cached queries
//! - Registry of mounted (in-use) queries, which lapse when not fetched again
//! - Revalidation of mounted queries when the backend comes back
//! - A stale-response guard so superseded fetches never overwrite newer data
//! - Backend reachability probing

use super::{Lookup, PersistedEntry, QueryKey, QueryPersister};
use crate::services::backend::{BackendCallError, BackendClient};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const MAX_CONCURRENT_REVALIDATIONS: usize = 8;

/// How a query result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fetched just now, or cached and younger than `stale_time`.
    Fresh,
    /// Cached and past `stale_time`; a revalidation is running.
    Stale,
    /// Cached and served because the backend is unreachable.
    Offline,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Fresh => "fresh",
            CacheStatus::Stale => "stale",
            CacheStatus::Offline => "offline",
        }
    }
}

/// Data served for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub data: Value,
    pub status: CacheStatus,
    pub fetched_at: DateTime<Utc>,
}

impl QueryResult {
    fn from_entry(entry: PersistedEntry, status: CacheStatus) -> Self {
        Self {
            data: entry.data,
            status,
            fetched_at: entry.fetched_at,
        }
    }
}

/// A query in use and the bearer token to refetch it with.
struct Mount {
    access_token: String,
    touched: Instant,
}

/// Cache-aware client for backend queries.
///
/// Created once at startup and shared through `AppState`; call
/// [`QueryClient::shutdown`] before exit.
pub struct QueryClient {
    persister: QueryPersister,
    backend: BackendClient,
    /// Queries currently in use.
    mounted: DashMap<QueryKey, Mount>,
    /// Id of the latest in-flight request per key (stale-response guard).
    /// Removed when that request finishes or the key is invalidated.
    latest_request: DashMap<QueryKey, u64>,
    /// Keys with a background revalidation in flight.
    refreshing: DashMap<QueryKey, ()>,
    next_request: AtomicU64,
    online: AtomicBool,
    revalidation: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl QueryClient {
    pub fn new(persister: QueryPersister, backend: BackendClient) -> Arc<Self> {
        Arc::new(Self {
            persister,
            backend,
            mounted: DashMap::new(),
            latest_request: DashMap::new(),
            refreshing: DashMap::new(),
            next_request: AtomicU64::new(1),
            online: AtomicBool::new(true),
            revalidation: Mutex::new(None),
            monitor: Mutex::new(None),
        })
    }

    pub fn persister(&self) -> &QueryPersister {
        &self.persister
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    // ─── Queries ─────────────────────────────────────────────────

    /// Resolve a query through the cache, mounting it.
    ///
    /// - fresh hit: served as is
    /// - stale hit: served as `Stale` while a background revalidation runs
    /// - any hit while the backend is unreachable: served as `Offline`
    /// - miss: fetched from the backend; `Offline` error when unreachable
    pub async fn fetch(
        self: &Arc<Self>,
        key: &QueryKey,
        access_token: &str,
    ) -> Result<QueryResult, BackendCallError> {
        self.mount(key.clone(), access_token);

        match self.persister.get(key).await {
            Lookup::Fresh(entry) if self.is_online() => {
                Ok(QueryResult::from_entry(entry, CacheStatus::Fresh))
            }
            Lookup::Stale(entry) if self.is_online() => {
                self.spawn_revalidation(key.clone());
                Ok(QueryResult::from_entry(entry, CacheStatus::Stale))
            }
            Lookup::Fresh(entry) | Lookup::Stale(entry) => {
                Ok(QueryResult::from_entry(entry, CacheStatus::Offline))
            }
            Lookup::Miss if !self.is_online() => Err(BackendCallError::Offline),
            Lookup::Miss => self.load(key, access_token).await,
        }
    }

    /// Forward a mutation and evict the cached entry it invalidates.
    pub async fn mutate(
        self: &Arc<Self>,
        key: &QueryKey,
        access_token: &str,
        body: &Value,
    ) -> Result<Value, BackendCallError> {
        if !self.is_online() {
            return Err(BackendCallError::Offline);
        }

        let result = self
            .backend
            .post_resource(access_token, &key.resource, &key.params, body)
            .await;

        match result {
            Ok(data) => {
                self.invalidate(key).await;
                Ok(data)
            }
            Err(e) => {
                self.note_failure(&e).await;
                Err(e)
            }
        }
    }

    /// Evict `key`. Fetches already in flight for it will not write back.
    pub async fn invalidate(&self, key: &QueryKey) {
        self.latest_request.remove(key);
        self.persister.remove(key).await;
    }

    /// Evict every cached variant of `resource` for `scope`, whatever its
    /// parameters. Fetches already in flight for them will not write back.
    pub async fn invalidate_resource(&self, scope: &str, resource: &str) {
        self.latest_request
            .retain(|key, _| !(key.scope == scope && key.resource == resource));
        self.persister.remove_resource(scope, resource).await;
    }

    /// Mark `key` as in use. Mounting again renews the mount and its token.
    pub fn mount(&self, key: QueryKey, access_token: &str) {
        self.mounted.insert(
            key,
            Mount {
                access_token: access_token.to_string(),
                touched: Instant::now(),
            },
        );
    }

    /// Stop tracking `key`; in-flight revalidations for it are discarded.
    pub fn unmount(&self, key: &QueryKey) {
        self.mounted.remove(key);
    }

    /// Number of live mounts. Lapsed mounts are dropped first.
    pub fn mounted_count(&self) -> usize {
        self.prune_mounts();
        self.mounted.len()
    }

    /// Number of requests whose responses may still be written back.
    pub fn in_flight_count(&self) -> usize {
        self.latest_request.len()
    }

    async fn load(
        &self,
        key: &QueryKey,
        access_token: &str,
    ) -> Result<QueryResult, BackendCallError> {
        let ticket = self.begin_request(key);

        let data = match self
            .backend
            .get_resource(access_token, &key.resource, &key.params)
            .await
        {
            Ok(data) => data,
            Err(e) => {
                self.drop_rejected_mount(key, access_token, &e);
                self.note_failure(&e).await;
                return Err(e);
            }
        };

        let request_id = ticket.id;
        if ticket.finish() {
            let entry = self.persister.set(key, data).await;
            return Ok(QueryResult::from_entry(entry, CacheStatus::Fresh));
        }

        tracing::debug!(resource = %key.resource, request_id, "Superseded response not cached");
        Ok(QueryResult::from_entry(
            PersistedEntry::new(data),
            CacheStatus::Fresh,
        ))
    }

    // ─── Revalidation ────────────────────────────────────────────

    fn spawn_revalidation(self: &Arc<Self>, key: QueryKey) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.revalidate(&key).await;
        });
    }

    /// Refetch one mounted query. Returns whether fresh data was stored.
    pub async fn revalidate(&self, key: &QueryKey) -> bool {
        if !self.is_online() {
            return false;
        }

        let Some(token) = self.mounted_token(key) else {
            return false;
        };

        let Some(_guard) = RefreshGuard::acquire(&self.refreshing, key) else {
            return false;
        };

        let ticket = self.begin_request(key);
        let request_id = ticket.id;
        match self
            .backend
            .get_resource(&token, &key.resource, &key.params)
            .await
        {
            Ok(data) => {
                if ticket.finish() && self.mounted.contains_key(key) {
                    self.persister.set(key, data).await;
                    true
                } else {
                    tracing::debug!(resource = %key.resource, request_id, "Discarding stale revalidation result");
                    false
                }
            }
            Err(e) => {
                tracing::warn!(resource = %key.resource, error = %e, "Revalidation failed");
                self.drop_rejected_mount(key, &token, &e);
                self.note_failure(&e).await;
                false
            }
        }
    }

    /// Revalidate every mounted query with bounded concurrency. Returns the
    /// number of queries refreshed.
    pub async fn revalidate_mounted(&self) -> usize {
        self.prune_mounts();
        let keys: Vec<QueryKey> = self.mounted.iter().map(|e| e.key().clone()).collect();
        tracing::info!(count = keys.len(), "Revalidating mounted queries");

        stream::iter(keys)
            .map(|key| async move { self.revalidate(&key).await })
            .buffer_unordered(MAX_CONCURRENT_REVALIDATIONS)
            .filter(|refreshed| std::future::ready(*refreshed))
            .count()
            .await
    }

    /// Abort a running revalidation of mounted queries, if any.
    pub async fn cancel_revalidation(&self) {
        if let Some(handle) = self.revalidation.lock().await.take() {
            handle.abort();
            tracing::debug!("Cancelled query revalidation");
        }
    }

    /// Wait for the current revalidation of mounted queries to finish.
    pub async fn wait_for_revalidation(&self) {
        let handle = self.revalidation.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // ─── Connectivity ────────────────────────────────────────────

    /// React to a change in backend reachability.
    ///
    /// offline → online revalidates all mounted queries (when configured);
    /// online → offline cancels revalidation and suspends background
    /// refetches until the backend returns.
    pub async fn on_connectivity_change(self: &Arc<Self>, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return;
        }

        if online {
            tracing::info!("Backend reachable again, leaving offline mode");
            if self.persister.config().refetch_on_reconnect {
                let this = Arc::clone(self);
                let handle = tokio::spawn(async move {
                    let refreshed = this.revalidate_mounted().await;
                    tracing::info!(refreshed, "Reconnect revalidation finished");
                });

                if let Some(previous) = self.revalidation.lock().await.replace(handle) {
                    previous.abort();
                }
            }
        } else {
            tracing::warn!("Backend unreachable, serving cached data in offline mode");
            self.cancel_revalidation().await;
        }
    }

    /// Start probing backend reachability every `interval`.
    pub async fn start_connectivity_monitor(self: &Arc<Self>, interval: Duration) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = this.backend.probe().await;
                this.on_connectivity_change(online).await;
            }
        });

        if let Some(previous) = self.monitor.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Stop background work. Entries are written through on `set`, so there
    /// is nothing left to flush.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.monitor.lock().await.take() {
            handle.abort();
        }
        self.cancel_revalidation().await;
        tracing::info!(
            cached = self.persister.memory_len(),
            degraded = self.persister.is_degraded(),
            "Query client shut down"
        );
    }

    // ─── Helpers ─────────────────────────────────────────────────

    fn begin_request(&self, key: &QueryKey) -> RequestTicket<'_> {
        let id = self.next_request.fetch_add(1, Ordering::SeqCst);
        self.latest_request.insert(key.clone(), id);
        RequestTicket {
            latest: &self.latest_request,
            key: key.clone(),
            id,
        }
    }

    /// Token of the live mount for `key`. A lapsed mount is dropped.
    fn mounted_token(&self, key: &QueryKey) -> Option<String> {
        let ttl = self.persister.config().mount_ttl;
        let token = self
            .mounted
            .get(key)
            .and_then(|mount| (mount.touched.elapsed() <= ttl).then(|| mount.access_token.clone()));

        if token.is_none() {
            self.mounted
                .remove_if(key, |_, mount| mount.touched.elapsed() > ttl);
        }
        token
    }

    fn prune_mounts(&self) {
        let ttl = self.persister.config().mount_ttl;
        self.mounted.retain(|_, mount| mount.touched.elapsed() <= ttl);
    }

    /// A token the backend refuses will not work for later refetches either.
    fn drop_rejected_mount(&self, key: &QueryKey, access_token: &str, err: &BackendCallError) {
        if matches!(err, BackendCallError::Status { status: 401 | 403, .. })
            && self
                .mounted
                .remove_if(key, |_, mount| mount.access_token == access_token)
                .is_some()
        {
            tracing::debug!(resource = %key.resource, "Unmounted query after backend rejected its token");
        }
    }

    /// A network failure means the backend is gone until the next probe.
    async fn note_failure(&self, err: &BackendCallError) {
        if matches!(err, BackendCallError::Network(_))
            && self.online.swap(false, Ordering::SeqCst)
        {
            tracing::warn!(error = %err, "Backend unreachable, entering offline mode");
            self.cancel_revalidation().await;
        }
    }
}

/// Request id registered as the latest for a key. Retired when finished or
/// dropped, unless a newer request or an invalidation replaced it.
struct RequestTicket<'a> {
    latest: &'a DashMap<QueryKey, u64>,
    key: QueryKey,
    id: u64,
}

impl RequestTicket<'_> {
    /// Retire the ticket; true if it was still the latest for its key.
    fn finish(self) -> bool {
        self.retire()
    }

    fn retire(&self) -> bool {
        self.latest
            .remove_if(&self.key, |_, latest| *latest == self.id)
            .is_some()
    }
}

impl Drop for RequestTicket<'_> {
    fn drop(&mut self) {
        self.retire();
    }
}

/// Marks a key as being revalidated; cleared on drop, including when the
/// owning task is aborted.
struct RefreshGuard<'a> {
    refreshing: &'a DashMap<QueryKey, ()>,
    key: QueryKey,
}

impl<'a> RefreshGuard<'a> {
    fn acquire(refreshing: &'a DashMap<QueryKey, ()>, key: &QueryKey) -> Option<Self> {
        match refreshing.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    refreshing,
                    key: key.clone(),
                })
            }
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.refreshing.remove(&self.key);
    }
}
