// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend data proxy served through the query cache.
//!
//! Every response is an action result, so UI code never has to handle a
//! thrown error:
//!
//! ```json
//! { "success": true, "data": ..., "status": "fresh", "fetchedAt": "..." }
//! { "success": false, "error": "..." }
//! ```

use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{CacheStatus, QueryKey, QueryResult};
use crate::error::{AppError, Result};
use crate::models::{Role, Session};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

/// Header reporting how a cached query was served.
pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

const MAX_RESOURCE_LEN: usize = 256;

/// Data access needs a committed role; any role will do.
const ANY_ROLE: &[Role] = &[Role::Owner, Role::Trainer, Role::Client];

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/query/{*resource}",
        get(get_query).post(post_mutation).delete(delete_query),
    )
}

/// Uniform result of a proxied query or mutation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CacheStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            status: None,
            fetched_at: None,
            error: None,
        }
    }

    fn cached(result: QueryResult) -> Self {
        Self {
            status: Some(result.status),
            fetched_at: Some(format_utc_rfc3339(result.fetched_at)),
            ..Self::success(result.data)
        }
    }

    fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            status: None,
            fetched_at: None,
            error: Some(error.to_string()),
        }
    }
}

/// Build the per-user cache key, rejecting resource paths that could escape
/// the backend API root.
fn query_key(
    session: &Session,
    resource: &str,
    params: BTreeMap<String, String>,
) -> Result<QueryKey> {
    validate_resource(resource)?;
    Ok(QueryKey::new(resource)
        .scoped(session.user.id.clone())
        .with_params(params))
}

fn validate_resource(resource: &str) -> Result<()> {
    let valid = !resource.is_empty()
        && resource.len() <= MAX_RESOURCE_LEN
        && !resource.starts_with('/')
        && !resource.split('/').any(|segment| segment.is_empty() || segment == "..")
        && resource
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_/".contains(c));

    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "invalid resource path '{}'",
            resource
        )))
    }
}

/// Cached read.
async fn get_query(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(resource): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response> {
    session.require_role(ANY_ROLE)?;
    let token = session.bearer()?;
    let key = query_key(&session, &resource, params)?;

    match state.query_client.fetch(&key, token).await {
        Ok(result) => {
            let status = result.status;
            let mut response = Json(ActionResult::cached(result)).into_response();
            response.headers_mut().insert(
                HeaderName::from_static(CACHE_STATUS_HEADER),
                HeaderValue::from_static(status.as_str()),
            );
            Ok(response)
        }
        Err(e) => {
            tracing::warn!(resource = %resource, error = %e, "Query failed");
            Ok((e.status_code(), Json(ActionResult::failure(&e))).into_response())
        }
    }
}

/// Forward a mutation; the cached read of the same key is invalidated.
async fn post_mutation(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(resource): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ActionResult>)> {
    session.require_role(ANY_ROLE)?;
    let token = session.bearer()?;
    let key = query_key(&session, &resource, params)?;

    match state.query_client.mutate(&key, token, &body).await {
        Ok(data) => Ok((StatusCode::OK, Json(ActionResult::success(data)))),
        Err(e) => {
            tracing::warn!(resource = %resource, error = %e, "Mutation failed");
            Ok((e.status_code(), Json(ActionResult::failure(&e))))
        }
    }
}

/// Drop a cached query and stop revalidating it.
async fn delete_query(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(resource): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<StatusCode> {
    let key = query_key(&session, &resource, params)?;
    state.query_client.unmount(&key);
    state.query_client.invalidate(&key).await;
    Ok(StatusCode::NO_CONTENT)
}
