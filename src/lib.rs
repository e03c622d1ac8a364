// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! gymdesk: backend-for-frontend of the gym management web app
//!
//! This crate resolves sessions (role and gym membership) against the gym
//! backend, and serves backend data to the UI through a persisted,
//! offline-aware query cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use anyhow::Context;
use cache::{QueryClient, QueryPersister};
use config::Config;
use services::{BackendClient, GoogleOAuth, SessionResolver};
use std::sync::Arc;

/// Shared application state.
///
/// Built once in `main`; `query_client` must be shut down before exit.
pub struct AppState {
    pub config: Config,
    pub backend: BackendClient,
    pub resolver: SessionResolver,
    pub google: GoogleOAuth,
    pub query_client: Arc<QueryClient>,
}

impl AppState {
    /// Wire up backend clients and the query cache for `config`.
    ///
    /// Never fails on cache storage problems; the persister degrades to
    /// memory-only instead.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let backend = BackendClient::new(&config.backend_url, config.backend_timeout)
            .context("failed to build backend client")?;
        let google = GoogleOAuth::new(&config)?;
        let persister = QueryPersister::open(config.cache.clone()).await;
        let query_client = QueryClient::new(persister, backend.clone());

        Ok(Self {
            resolver: SessionResolver::new(backend.clone()),
            backend,
            google,
            query_client,
            config,
        })
    }
}
