// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in routes: credentials, Google OAuth, auth error page, logout.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use validator::Validate;

use crate::error::{AppError, AuthError, AuthErrorCode, Result};
use crate::middleware::auth::{create_session_token, SESSION_COOKIE};
use crate::models::{Role, Session, SessionView};
use crate::time_utils::now_ms;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// OAuth `state` values older than this are rejected.
const OAUTH_STATE_MAX_AGE_MS: i64 = 10 * 60 * 1000;

/// Frontend route for actors that still have to pick a role.
const ROLE_SELECTION_PATH: &str = "/select-role";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/google", get(google_start))
        .route("/auth/google/callback", get(google_callback))
        .route("/auth/error", get(auth_error_page))
        .route("/auth/logout", get(logout))
}

// ─── Session issuing ─────────────────────────────────────────

/// Freshly issued session token.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub session: SessionView,
    /// Frontend path the actor should land on.
    pub redirect: String,
}

/// Frontend landing path for a session.
pub fn landing_path(session: &Session) -> &'static str {
    match session.role {
        Some(role) => role.dashboard_path(),
        None => ROLE_SELECTION_PATH,
    }
}

/// Sign `session`, store it in the session cookie and describe it.
pub(crate) fn issue_session(
    state: &AppState,
    jar: CookieJar,
    session: &Session,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let token = create_session_token(
        session,
        &state.config.session_signing_key,
        state.config.session_ttl,
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let jar = jar.add(session_cookie(&state.config.frontend_url, token.clone()));

    Ok((
        jar,
        Json(SessionResponse {
            token,
            session: session.view(),
            redirect: landing_path(session).to_string(),
        }),
    ))
}

fn session_cookie(frontend_url: &str, token: String) -> Cookie<'static> {
    let secure = frontend_url.starts_with("https://");
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

// ─── Credentials ─────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1, max = 256))]
    password: String,
}

/// Credentials sign-in.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let session = state
        .resolver
        .resolve_credentials(&body.email, &body.password)
        .await?;

    issue_session(&state, jar, &session)
}

// ─── Google OAuth ────────────────────────────────────────────

/// Query parameters for starting OAuth flow.
#[derive(Deserialize)]
pub struct GoogleStartParams {
    /// Frontend URL to return to after OAuth completes.
    #[serde(default)]
    redirect_uri: Option<String>,
    /// Role already chosen in the UI, applied to a new account.
    #[serde(default)]
    role: Option<Role>,
}

/// Start OAuth flow - redirect to Google.
async fn google_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GoogleStartParams>,
    headers: axum::http::HeaderMap,
) -> Result<Redirect> {
    let frontend_url = params
        .redirect_uri
        .filter(|uri| is_allowed_frontend(uri, &state.config.frontend_url))
        .map(|uri| uri.trim_end_matches('/').to_string())
        .unwrap_or_else(|| state.config.frontend_url.clone());

    let oauth_state = sign_state(
        &OAuthState {
            frontend_url: frontend_url.clone(),
            role: params.role,
            issued_at_ms: now_ms(),
        },
        &state.config.oauth_state_key,
    )?;

    let callback_url = callback_url(&headers);
    let auth_url = state.google.authorize_url(&callback_url, &oauth_state);

    tracing::info!(
        frontend_url = %frontend_url,
        preselected_role = ?params.role,
        "Starting OAuth flow, redirecting to Google"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - resolve the session and hand it to the frontend.
///
/// Failures redirect to the frontend auth error page with the error code.
async fn google_callback(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> (CookieJar, Redirect) {
    let Some(oauth_state) = verify_state(&params.state, &state.config.oauth_state_key, now_ms())
    else {
        tracing::warn!("Invalid, expired or tampered OAuth state");
        return (
            jar,
            error_redirect(&state.config.frontend_url, AuthErrorCode::UnknownError),
        );
    };
    let frontend_url = oauth_state.frontend_url;

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Google");
        return (
            jar,
            error_redirect(&frontend_url, AuthErrorCode::UnknownError),
        );
    }

    let Some(code) = params.code else {
        return (
            jar,
            error_redirect(&frontend_url, AuthErrorCode::UnknownError),
        );
    };

    let callback_url = callback_url(&headers);
    let session = match resolve_google(&state, &code, &callback_url, oauth_state.role).await {
        Ok(session) => session,
        Err(e) => return (jar, error_redirect(&frontend_url, e.code)),
    };

    match issue_session(&state, jar.clone(), &session) {
        Ok((jar, Json(issued))) => {
            let redirect_url = format!(
                "{}/callback?token={}&next={}",
                frontend_url,
                issued.token,
                urlencoding::encode(&issued.redirect)
            );
            (jar, Redirect::temporary(&redirect_url))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to issue session after OAuth");
            (
                jar,
                error_redirect(&frontend_url, AuthErrorCode::UnknownError),
            )
        }
    }
}

async fn resolve_google(
    state: &AppState,
    code: &str,
    callback_url: &str,
    preselected: Option<Role>,
) -> std::result::Result<Session, AuthError> {
    let profile = state
        .google
        .fetch_profile(code, callback_url)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Google profile fetch failed");
            AuthError::from(&e)
        })?;

    state.resolver.resolve_oauth(&profile, preselected).await
}

fn error_redirect(frontend_url: &str, code: AuthErrorCode) -> Redirect {
    Redirect::temporary(&format!("{}/auth/error?code={}", frontend_url, code))
}

/// Callback URL derived from the request host.
fn callback_url(headers: &axum::http::HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };

    format!("{}://{}/auth/google/callback", scheme, host)
}

/// Whether `uri` may receive the session token after OAuth: the configured
/// frontend (same origin, at or below its path) or a local dev server.
fn is_allowed_frontend(uri: &str, frontend_url: &str) -> bool {
    let Ok(candidate) = Url::parse(uri) else {
        return false;
    };
    if !candidate.username().is_empty()
        || candidate.password().is_some()
        || candidate.query().is_some()
        || candidate.fragment().is_some()
    {
        return false;
    }

    if super::is_local_dev(&candidate) {
        return true;
    }

    let Ok(frontend) = Url::parse(frontend_url) else {
        return false;
    };
    let base = frontend.path().trim_end_matches('/');
    candidate.origin() == frontend.origin()
        && (candidate.path() == base || candidate.path().starts_with(&format!("{}/", base)))
}

// ─── OAuth state ─────────────────────────────────────────────

/// Data round-tripped through the OAuth provider.
#[derive(Debug, Clone, PartialEq)]
struct OAuthState {
    frontend_url: String,
    role: Option<Role>,
    issued_at_ms: i64,
}

/// Encode as base64("frontend_url|role|timestamp_hex|signature_hex").
fn sign_state(state: &OAuthState, secret: &[u8]) -> Result<String> {
    let payload = format!(
        "{}|{}|{:x}",
        state.frontend_url,
        state.role.map(Role::as_str).unwrap_or(""),
        state.issued_at_ms
    );

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify signature and age, then decode the OAuth state.
fn verify_state(state: &str, secret: &[u8], now_ms: i64) -> Option<OAuthState> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // The frontend URL may itself contain '|', so split from the right.
    let mut parts = state_str.rsplitn(4, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let role = parts.next()?;
    let frontend_url = parts.next()?;

    let payload = format!("{}|{}|{}", frontend_url, role, timestamp_hex);
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_at_ms = i64::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued_at_ms) > OAUTH_STATE_MAX_AGE_MS {
        return None;
    }

    let role = match role {
        "" => None,
        r => Some(r.parse::<Role>().ok()?),
    };

    Some(OAuthState {
        frontend_url: frontend_url.to_string(),
        role,
        issued_at_ms,
    })
}

// ─── Error page & logout ─────────────────────────────────────

#[derive(Deserialize)]
pub struct AuthErrorParams {
    #[serde(default)]
    code: Option<String>,
}

/// Content of the dedicated auth error page.
#[derive(Serialize)]
pub struct AuthErrorPage {
    pub code: AuthErrorCode,
    pub message: &'static str,
    /// Where the retry action points.
    pub retry: &'static str,
}

async fn auth_error_page(Query(params): Query<AuthErrorParams>) -> Json<AuthErrorPage> {
    let code = params
        .code
        .and_then(|c| serde_json::from_value(serde_json::Value::String(c)).ok())
        .unwrap_or(AuthErrorCode::UnknownError);

    let retry = match code {
        AuthErrorCode::RoleAlreadySet => "/auth/logout",
        _ => "/login",
    };

    Json(AuthErrorPage {
        code,
        message: code.message(),
        retry,
    })
}

/// Logout - clear the session cookie and return to the frontend.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::temporary(&state.config.frontend_url))
}
