// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payloads exchanged with the gym backend API.
//!
//! Every response is wrapped in an [`Envelope`]. Required fields are
//! required here too, so a malformed payload fails at decode time instead
//! of surfacing as missing data further in.

use super::{GymSummary, Role};
use serde::{Deserialize, Serialize};

/// Backend response envelope: `{ msg, data?, error? }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// User record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub gym: Option<GymSummary>,
    #[serde(default)]
    pub disabled: bool,
}

/// Backend response to a sign-in call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendLogin {
    pub access_token: String,
    pub user: BackendUser,
}

#[derive(Debug, Serialize)]
pub struct CredentialsLogin<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct NewOAuthUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub provider: &'a str,
}

#[derive(Debug, Serialize)]
pub struct OAuthLogin<'a> {
    pub email: &'a str,
    pub provider: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RoleAssignment {
    pub role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMark<'a> {
    pub gym_id: &'a str,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct GymOnboarding<'a> {
    pub hash: &'a str,
}
