// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! QR code routes: attendance code generation and scan handling.

use axum::{extract::State, routing::get, routing::post, Extension, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::auth::{issue_session, SessionResponse};
use crate::error::{AppError, Result};
use crate::models::{AttendanceAction, GymSummary, QrAction, Role, Session};
use crate::time_utils::unix_now;
use crate::AppState;

/// Cached resource holding a client's attendance history.
const ATTENDANCE_RESOURCE: &str = "attendance";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/qr/attendance", get(attendance_code))
        .route("/api/qr/scan", post(scan))
}

/// QR code content, both as the string to encode and decoded.
#[derive(Debug, Serialize)]
pub struct QrCode {
    pub payload: String,
    pub action: QrAction,
}

/// Attendance code for the owner's gym, stamped now.
async fn attendance_code(Extension(session): Extension<Session>) -> Result<Json<QrCode>> {
    session.require_role(&[Role::Owner])?;
    let gym = session
        .gym
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("no gym attached to this account".to_string()))?;

    let action = QrAction::Attendance(AttendanceAction {
        gymname: gym.name.clone(),
        gymid: gym.id.clone(),
        timestamp: unix_now(),
    });
    let payload = action
        .to_payload()
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok(Json(QrCode { payload, action }))
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    payload: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Attendance,
    Onboarding,
}

/// Outcome of a handled scan. Onboarding changes gym membership, so it
/// also carries a re-issued session.
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub action: ScanKind,
    pub gym: GymSummary,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionResponse>,
}

/// Decode a scanned payload and dispatch on its action.
async fn scan(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
    Json(body): Json<ScanRequest>,
) -> Result<(CookieJar, Json<ScanResponse>)> {
    let action = QrAction::parse(&body.payload).map_err(|e| {
        tracing::debug!(error = %e, "Rejected QR payload");
        AppError::BadRequest(e.to_string())
    })?;

    tracing::debug!(
        user_id = %session.user.id,
        gym_id = %action.gym_id(),
        "Handling QR scan"
    );

    match action {
        QrAction::Attendance(attendance) => {
            session.require_role(&[Role::Client])?;
            if let Some(gym) = &session.gym {
                if gym.id != attendance.gymid {
                    return Err(AppError::Forbidden(
                        "attendance code belongs to another gym".to_string(),
                    ));
                }
            }

            let result = state
                .backend
                .mark_attendance(session.bearer()?, &attendance.gymid, attendance.timestamp)
                .await?;

            state
                .query_client
                .invalidate_resource(&session.user.id, ATTENDANCE_RESOURCE)
                .await;

            tracing::info!(
                user_id = %session.user.id,
                gym_id = %attendance.gymid,
                "Attendance recorded"
            );

            Ok((
                jar,
                Json(ScanResponse {
                    action: ScanKind::Attendance,
                    gym: GymSummary {
                        id: attendance.gymid,
                        name: attendance.gymname,
                    },
                    result,
                    session: None,
                }),
            ))
        }
        QrAction::Onboarding(onboarding) => {
            session.require_role(&[Role::Trainer, Role::Client])?;

            let result = state
                .backend
                .onboard_gym(session.bearer()?, &onboarding.gymid, &onboarding.hash)
                .await?;

            let refreshed = state.resolver.refresh(&session).await?;
            let (jar, Json(issued)) = issue_session(&state, jar, &refreshed)?;

            tracing::info!(
                user_id = %session.user.id,
                gym_id = %onboarding.gymid,
                "Joined gym"
            );

            Ok((
                jar,
                Json(ScanResponse {
                    action: ScanKind::Onboarding,
                    gym: GymSummary {
                        id: onboarding.gymid,
                        name: onboarding.gymname,
                    },
                    result,
                    session: Some(issued),
                }),
            ))
        }
    }
}
