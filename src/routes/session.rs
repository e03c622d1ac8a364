// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session routes: read, role upgrade and refresh.

use axum::{extract::State, routing::get, routing::post, Extension, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::sync::Arc;

use super::auth::{issue_session, SessionResponse};
use crate::error::Result;
use crate::models::{Role, Session, SessionClaims, SessionView};
use crate::services::SessionResolver;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/session/role", post(select_role))
        .route("/api/session/refresh", post(refresh_session))
}

/// Current session as seen by the UI.
async fn get_session(Extension(claims): Extension<SessionClaims>) -> Json<SessionView> {
    Json(SessionResolver::project(claims))
}

#[derive(Debug, Deserialize)]
pub struct RoleSelection {
    role: Role,
}

/// Commit the role picked on the role selection screen and re-issue the
/// session token.
async fn select_role(
    State(state): State<Arc<AppState>>,
    Extension(mut session): Extension<Session>,
    jar: CookieJar,
    Json(body): Json<RoleSelection>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    state.resolver.upgrade(&mut session, body.role).await?;
    issue_session(&state, jar, &session)
}

/// Re-read the backend user (gym membership may have changed).
async fn refresh_session(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let refreshed = state.resolver.refresh(&session).await?;
    issue_session(&state, jar, &refreshed)
}
