// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Values are read once at startup. Secrets (session signing key, OAuth
//! state key, Google client secret) come from the environment as well; the
//! deployment injects them as env vars.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Base URL of the gym backend REST API
    pub backend_url: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Lifetime of issued session tokens
    pub session_ttl: Duration,
    /// Request timeout for the outward HTTP client
    pub backend_timeout: Duration,
    /// Interval between backend reachability probes
    pub connectivity_probe_interval: Duration,
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    pub google_auth_url: String,
    pub google_token_url: String,
    pub google_userinfo_url: String,
    /// Query cache persister settings
    pub cache: CacheConfig,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub session_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
}

/// Settings for the persisted query cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entries older than this are treated as absent.
    pub max_age: Duration,
    /// Entries younger than this are served without a background refetch.
    pub stale_time: Duration,
    /// Revalidate mounted queries when the backend becomes reachable again.
    pub refetch_on_reconnect: bool,
    /// A query not fetched again within this long is no longer mounted.
    pub mount_ttl: Duration,
    /// Changing this orphans every previously persisted entry.
    pub buster_version: String,
    /// Deployment namespace for the durable store.
    pub namespace: String,
    /// Root directory of the durable store.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 60 * 60),
            stale_time: Duration::from_secs(60),
            refetch_on_reconnect: true,
            mount_ttl: Duration::from_secs(15 * 60),
            buster_version: "v1".to_string(),
            namespace: "gymdesk".to_string(),
            dir: PathBuf::from(".gymdesk-cache"),
        }
    }
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:9".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            port: 8080,
            session_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            backend_timeout: Duration::from_secs(5),
            connectivity_probe_interval: Duration::from_secs(15),
            google_client_id: "test_client_id".to_string(),
            google_auth_url: GOOGLE_AUTH_URL.to_string(),
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
            google_userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            cache: CacheConfig {
                dir: env::temp_dir().join("gymdesk-test-cache"),
                ..CacheConfig::default()
            },
            google_client_secret: "test_secret".to_string(),
            session_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honoured for local
    /// development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = CacheConfig::default();
        let cache = CacheConfig {
            max_age: Duration::from_secs(parse_or("CACHE_MAX_AGE_SECS", 24 * 60 * 60)?),
            stale_time: Duration::from_secs(parse_or("CACHE_STALE_TIME_SECS", 60)?),
            refetch_on_reconnect: parse_or("CACHE_REFETCH_ON_RECONNECT", true)?,
            mount_ttl: Duration::from_secs(parse_or("CACHE_MOUNT_TTL_SECS", 15 * 60)?),
            buster_version: env::var("CACHE_BUSTER").unwrap_or(defaults.buster_version),
            namespace: env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            dir: env::var("CACHE_DIR").map(PathBuf::from).unwrap_or(defaults.dir),
        };

        if cache.buster_version.trim().is_empty() {
            return Err(ConfigError::Invalid("CACHE_BUSTER"));
        }

        Ok(Self {
            backend_url: env::var("BACKEND_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("BACKEND_URL"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: parse_or("PORT", 8080)?,
            session_ttl: Duration::from_secs(parse_or::<u64>("SESSION_TTL_HOURS", 720)? * 3600),
            backend_timeout: Duration::from_secs(parse_or("BACKEND_TIMEOUT_SECS", 10)?),
            connectivity_probe_interval: Duration::from_secs(parse_or(
                "CONNECTIVITY_PROBE_SECS",
                15,
            )?),
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            google_auth_url: env::var("GOOGLE_AUTH_URL")
                .unwrap_or_else(|_| GOOGLE_AUTH_URL.to_string()),
            google_token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| GOOGLE_TOKEN_URL.to_string()),
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| GOOGLE_USERINFO_URL.to_string()),
            cache,

            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?,
            session_signing_key: env::var("SESSION_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("SESSION_SIGNING_KEY"))?
                .into_bytes(),
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
        })
    }
}

/// Read an optional variable, falling back to `default` when unset.
/// A set but unparseable value is an error rather than a silent default.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
