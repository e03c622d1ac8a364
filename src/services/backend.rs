// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gym backend API client.
//!
//! Handles:
//! - User lookup, sign-in and provisioning
//! - Role assignment
//! - Attendance and gym onboarding
//! - Generic resource reads/writes for the data proxy
//! - Reachability probing
//!
//! All responses use the `{ msg, data?, error? }` envelope. A non-2xx
//! status is a failure regardless of what the body says.

use crate::models::backend::{
    AttendanceMark, CredentialsLogin, GymOnboarding, NewOAuthUser, OAuthLogin, RoleAssignment,
};
use crate::models::{BackendLogin, BackendUser, Envelope, Role};
use anyhow::Context;
use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

/// Failure of a call to the gym backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendCallError {
    #[error("backend unreachable: {0}")]
    Network(String),

    #[error("backend request timed out")]
    Timeout,

    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed backend response: {0}")]
    Decode(String),

    #[error("backend is offline")]
    Offline,
}

impl BackendCallError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendCallError::Status { status: 404, .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BackendCallError::Status { status: 409, .. })
    }

    /// HTTP status used when the error is surfaced to our own callers.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BackendCallError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            BackendCallError::Offline => StatusCode::SERVICE_UNAVAILABLE,
            BackendCallError::Status { status, .. } if (400..500).contains(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for BackendCallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendCallError::Timeout
        } else if err.is_decode() {
            BackendCallError::Decode(err.to_string())
        } else {
            BackendCallError::Network(err.to_string())
        }
    }
}

/// Gym backend API client.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client for the backend at `base_url`.
    ///
    /// `timeout` bounds every request; this layer defines no other timeouts.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building backend HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ─── Users ───────────────────────────────────────────────────

    /// Look up a user by email. A 404 means no such user.
    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<BackendUser>, BackendCallError> {
        let url = format!(
            "{}/users/email/{}",
            self.base_url,
            urlencoding::encode(email)
        );

        match self.send_data(self.http.get(&url)).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Credentials sign-in.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<BackendLogin, BackendCallError> {
        let url = format!("{}/auth/login", self.base_url);
        self.send_data(
            self.http
                .post(&url)
                .json(&CredentialsLogin { email, password }),
        )
        .await
    }

    /// Create a provisional user (no role) for a first OAuth sign-in.
    pub async fn create_oauth_user(
        &self,
        name: &str,
        email: &str,
        provider: &str,
    ) -> Result<BackendUser, BackendCallError> {
        let url = format!("{}/users", self.base_url);
        self.send_data(self.http.post(&url).json(&NewOAuthUser {
            name,
            email,
            provider,
        }))
        .await
    }

    /// Obtain a backend access token for an OAuth-verified user.
    pub async fn oauth_login(
        &self,
        email: &str,
        provider: &str,
    ) -> Result<BackendLogin, BackendCallError> {
        let url = format!("{}/auth/oauth", self.base_url);
        self.send_data(self.http.post(&url).json(&OAuthLogin { email, provider }))
            .await
    }

    /// Commit a role for a user. The backend answers 409 if one is already set.
    pub async fn assign_role(
        &self,
        access_token: Option<&str>,
        user_id: &str,
        role: Role,
    ) -> Result<BackendUser, BackendCallError> {
        let url = format!(
            "{}/users/{}/role",
            self.base_url,
            urlencoding::encode(user_id)
        );
        let mut request = self.http.patch(&url).json(&RoleAssignment { role });
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        self.send_data(request).await
    }

    // ─── Gym actions ─────────────────────────────────────────────

    /// Record a check-in at a gym.
    pub async fn mark_attendance(
        &self,
        access_token: &str,
        gym_id: &str,
        timestamp: i64,
    ) -> Result<Value, BackendCallError> {
        let url = format!("{}/attendance", self.base_url);
        self.send_value(
            self.http
                .post(&url)
                .bearer_auth(access_token)
                .json(&AttendanceMark { gym_id, timestamp }),
        )
        .await
    }

    /// Attach the caller to a gym using the invitation hash from its QR code.
    pub async fn onboard_gym(
        &self,
        access_token: &str,
        gym_id: &str,
        hash: &str,
    ) -> Result<Value, BackendCallError> {
        let url = format!(
            "{}/gyms/{}/onboard",
            self.base_url,
            urlencoding::encode(gym_id)
        );
        self.send_value(
            self.http
                .post(&url)
                .bearer_auth(access_token)
                .json(&GymOnboarding { hash }),
        )
        .await
    }

    // ─── Generic resources ───────────────────────────────────────

    /// GET an arbitrary backend resource.
    pub async fn get_resource(
        &self,
        access_token: &str,
        resource: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Value, BackendCallError> {
        let url = format!("{}/{}", self.base_url, resource);
        self.send_value(self.http.get(&url).bearer_auth(access_token).query(params))
            .await
    }

    /// POST a mutation to an arbitrary backend resource.
    pub async fn post_resource<B: Serialize + ?Sized>(
        &self,
        access_token: &str,
        resource: &str,
        params: &BTreeMap<String, String>,
        body: &B,
    ) -> Result<Value, BackendCallError> {
        let url = format!("{}/{}", self.base_url, resource);
        self.send_value(
            self.http
                .post(&url)
                .bearer_auth(access_token)
                .query(params)
                .json(body),
        )
        .await
    }

    /// Whether the backend answers its health endpoint.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Backend probe failed");
                false
            }
        }
    }

    // ─── Helpers ─────────────────────────────────────────────────

    /// Send a request whose envelope must carry `data`.
    async fn send_data<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendCallError> {
        let envelope: Envelope<T> = self.send(request).await?;
        envelope.data.ok_or_else(|| {
            BackendCallError::Decode(format!(
                "response has no data (msg: {})",
                envelope.msg.unwrap_or_default()
            ))
        })
    }

    /// Send a request whose `data` may be absent (mapped to `null`).
    async fn send_value(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, BackendCallError> {
        let envelope: Envelope<Value> = self.send(request).await?;
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Envelope<T>, BackendCallError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            tracing::debug!(status = status.as_u16(), message = %message, "Backend call failed");
            return Err(BackendCallError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| BackendCallError::Decode(e.to_string()))
    }
}

/// Pull a readable message out of an error body, preferring the envelope's
/// `error` or `msg` field over the raw text.
fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<Envelope<Value>>(body) {
        match envelope.error {
            Some(Value::String(s)) => return s,
            Some(Value::Null) | None => {}
            Some(other) => return other.to_string(),
        }
        if let Some(msg) = envelope.msg {
            return msg;
        }
    }

    body.chars().take(MAX_ERROR_BODY).collect()
}
