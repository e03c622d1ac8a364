// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth client (authorization-code flow).

use crate::config::Config;
use crate::services::backend::BackendCallError;
use anyhow::Context;
use serde::Deserialize;

/// Provider name recorded on backend users created through this flow.
pub const PROVIDER: &str = "google";

const SCOPES: &str = "openid email profile";

/// Profile returned by the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProfile {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

impl OAuthProfile {
    /// Display name, falling back to the local part of the email.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
}

/// Google OAuth client.
#[derive(Clone)]
pub struct GoogleOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuth {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.backend_timeout)
            .build()
            .context("failed building OAuth HTTP client")?;

        Ok(Self {
            http,
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            auth_url: config.google_auth_url.clone(),
            token_url: config.google_token_url.clone(),
            userinfo_url: config.google_userinfo_url.clone(),
        })
    }

    /// URL the browser is sent to in order to start sign-in.
    pub fn authorize_url(&self, callback_url: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&prompt=select_account",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(callback_url),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code and fetch the signed-in profile.
    pub async fn fetch_profile(
        &self,
        code: &str,
        callback_url: &str,
    ) -> Result<OAuthProfile, BackendCallError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", callback_url),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google token exchange failed");
            return Err(BackendCallError::Status {
                status: status.as_u16(),
                message: "token exchange failed".to_string(),
            });
        }

        let tokens: TokenExchangeResponse = response.json().await?;

        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendCallError::Status {
                status: response.status().as_u16(),
                message: "userinfo request failed".to_string(),
            });
        }

        let profile: OAuthProfile = response.json().await?;
        if profile.email_verified == Some(false) {
            return Err(BackendCallError::Status {
                status: 403,
                message: "email address is not verified".to_string(),
            });
        }

        Ok(profile)
    }
}
