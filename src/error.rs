// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::services::backend::BackendCallError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication failure categories, as rendered by the auth error page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorCode {
    UserNotFound,
    InvalidCredentials,
    RoleAlreadySet,
    AccountDisabled,
    NetworkError,
    TimeoutError,
    ServerError,
    UnknownError,
}

impl AuthErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthErrorCode::UserNotFound => "USER_NOT_FOUND",
            AuthErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthErrorCode::RoleAlreadySet => "ROLE_ALREADY_SET",
            AuthErrorCode::AccountDisabled => "ACCOUNT_DISABLED",
            AuthErrorCode::NetworkError => "NETWORK_ERROR",
            AuthErrorCode::TimeoutError => "TIMEOUT_ERROR",
            AuthErrorCode::ServerError => "SERVER_ERROR",
            AuthErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Human-readable message shown on the auth error page.
    pub fn message(self) -> &'static str {
        match self {
            AuthErrorCode::UserNotFound => "No account exists for this email address.",
            AuthErrorCode::InvalidCredentials => "The email or password is incorrect.",
            AuthErrorCode::RoleAlreadySet => {
                "A role has already been chosen for this account. Sign in again to switch."
            }
            AuthErrorCode::AccountDisabled => "This account has been disabled.",
            AuthErrorCode::NetworkError => "Could not reach the server. Check your connection.",
            AuthErrorCode::TimeoutError => "The server took too long to respond.",
            AuthErrorCode::ServerError => "The server ran into a problem. Try again shortly.",
            AuthErrorCode::UnknownError => "Something went wrong while signing in.",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            AuthErrorCode::UserNotFound => StatusCode::NOT_FOUND,
            AuthErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthErrorCode::RoleAlreadySet => StatusCode::CONFLICT,
            AuthErrorCode::AccountDisabled => StatusCode::FORBIDDEN,
            AuthErrorCode::NetworkError | AuthErrorCode::ServerError => StatusCode::BAD_GATEWAY,
            AuthErrorCode::TimeoutError => StatusCode::GATEWAY_TIMEOUT,
            AuthErrorCode::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed authentication failure. Never replaced by a default role.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {}", .code.message())]
pub struct AuthError {
    pub code: AuthErrorCode,
}

impl AuthError {
    pub const fn new(code: AuthErrorCode) -> Self {
        Self { code }
    }
}

impl From<AuthErrorCode> for AuthError {
    fn from(code: AuthErrorCode) -> Self {
        Self::new(code)
    }
}

impl From<&BackendCallError> for AuthError {
    fn from(err: &BackendCallError) -> Self {
        let code = match err {
            BackendCallError::Network(_) | BackendCallError::Offline => AuthErrorCode::NetworkError,
            BackendCallError::Timeout => AuthErrorCode::TimeoutError,
            BackendCallError::Status { status, .. } => match *status {
                401 => AuthErrorCode::InvalidCredentials,
                403 => AuthErrorCode::AccountDisabled,
                404 => AuthErrorCode::UserNotFound,
                409 => AuthErrorCode::RoleAlreadySet,
                s if s >= 500 => AuthErrorCode::ServerError,
                _ => AuthErrorCode::UnknownError,
            },
            BackendCallError::Decode(_) => AuthErrorCode::ServerError,
        };
        Self::new(code)
    }
}

impl From<BackendCallError> for AuthError {
    fn from(err: BackendCallError) -> Self {
        Self::from(&err)
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("A role must be selected first")]
    RoleRequired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendCallError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<AuthErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut code = None;
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::RoleRequired => (
                StatusCode::FORBIDDEN,
                "role_required",
                Some(self.to_string()),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Auth(err) => {
                tracing::warn!(code = %err.code, "Authentication failed");
                code = Some(err.code);
                (
                    err.code.status(),
                    "auth_error",
                    Some(err.code.message().to_string()),
                )
            }
            AppError::Backend(err) => {
                tracing::warn!(error = %err, "Backend call failed");
                (err.status_code(), "backend_error", Some(err.to_string()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            code,
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
