// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT session middleware.

use crate::models::{Session, SessionClaims};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "gym_session";

/// Middleware that requires a valid session token.
///
/// The decoded [`SessionClaims`] and the [`Session`] built from them are
/// inserted into request extensions.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return Err(StatusCode::UNAUTHORIZED),
        }
    };

    let claims = decode_session_token(&token, &state.config.session_signing_key)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(claims.clone());
    request.extensions_mut().insert(Session::from(claims));

    Ok(next.run(request).await)
}

/// Sign a session into a JWT valid for `ttl`.
pub fn create_session_token(
    session: &Session,
    signing_key: &[u8],
    ttl: Duration,
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = crate::time_utils::unix_now() as usize;
    let claims = session.to_claims(now, now + ttl.as_secs() as usize);

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

/// Verify and decode a session JWT.
pub fn decode_session_token(
    token: &str,
    signing_key: &[u8],
) -> jsonwebtoken::errors::Result<SessionClaims> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);
    decode::<SessionClaims>(token, &key, &validation).map(|data| data.claims)
}
