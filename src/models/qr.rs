// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JSON payloads carried inside gym QR codes.
//!
//! Two shapes exist, told apart by their single top-level key:
//!
//! ```json
//! { "OnboardingAction": { "hash": "...", "gymname": "...", "gymid": "..." } }
//! { "AttendanceAction": { "gymname": "...", "gymid": "...", "timestamp": 1700000000 } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

const ONBOARDING_KEY: &str = "OnboardingAction";
const ATTENDANCE_KEY: &str = "AttendanceAction";

/// Invitation to attach the scanning actor to a gym.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingAction {
    pub hash: String,
    pub gymname: String,
    pub gymid: String,
}

/// Check-in at a gym.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceAction {
    pub gymname: String,
    pub gymid: String,
    /// Unix timestamp (seconds) at which the code was generated
    pub timestamp: i64,
}

/// A decoded QR payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QrAction {
    #[serde(rename = "OnboardingAction")]
    Onboarding(OnboardingAction),
    #[serde(rename = "AttendanceAction")]
    Attendance(AttendanceAction),
}

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("payload carries no known action")]
    UnknownAction,

    #[error("payload carries more than one action")]
    Ambiguous,

    #[error("malformed {kind}: {source}")]
    Malformed {
        kind: &'static str,
        source: serde_json::Error,
    },
}

impl QrAction {
    /// Decode a scanned payload, checking the discriminating key before
    /// trusting either shape.
    pub fn parse(raw: &str) -> Result<Self, QrError> {
        let value: Value = serde_json::from_str(raw.trim())?;
        let Value::Object(mut map) = value else {
            return Err(QrError::NotAnObject);
        };

        let onboarding = map.remove(ONBOARDING_KEY);
        let attendance = map.remove(ATTENDANCE_KEY);

        match (onboarding, attendance) {
            (Some(body), None) => serde_json::from_value(body)
                .map(QrAction::Onboarding)
                .map_err(|source| QrError::Malformed {
                    kind: ONBOARDING_KEY,
                    source,
                }),
            (None, Some(body)) => serde_json::from_value(body)
                .map(QrAction::Attendance)
                .map_err(|source| QrError::Malformed {
                    kind: ATTENDANCE_KEY,
                    source,
                }),
            (Some(_), Some(_)) => Err(QrError::Ambiguous),
            (None, None) => Err(QrError::UnknownAction),
        }
    }

    /// Encode as the JSON string placed in a QR code.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn gym_id(&self) -> &str {
        match self {
            QrAction::Onboarding(a) => &a.gymid,
            QrAction::Attendance(a) => &a.gymid,
        }
    }
}
