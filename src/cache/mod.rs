// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persisted query cache.
//!
//! Keeps a namespaced, durable copy of backend query results so data stays
//! available across restarts and while the backend is unreachable, while
//! still preferring live data whenever the backend answers.

pub mod client;
pub mod entry;
pub mod key;
pub mod persister;
pub mod store;

pub use client::{CacheStatus, QueryClient, QueryResult};
pub use entry::{Freshness, Lookup, PersistedEntry};
pub use key::QueryKey;
pub use persister::QueryPersister;
pub use store::{FileStore, PersistenceError};
