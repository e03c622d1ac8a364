// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session model: the signed context identifying the current actor.

use super::{BackendUser, Role};
use crate::error::AppError;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Minimal gym descriptor embedded in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GymSummary {
    pub id: String,
    pub name: String,
}

/// Identity fields, fixed at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// An authenticated actor's context.
///
/// `role` moves from `None` to `Some` at most once; changing a committed
/// role requires signing in again.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: SessionUser,
    pub role: Option<Role>,
    pub gym: Option<GymSummary>,
    pub access_token: Option<String>,
}

impl Session {
    /// Build a session from a backend user record and its bearer token.
    pub fn from_backend(user: &BackendUser, access_token: Option<String>) -> Self {
        Self {
            user: SessionUser {
                id: user.id.clone(),
                name: user.name.clone(),
                email: Some(user.email.clone()),
            },
            role: user.role,
            gym: user.gym.clone(),
            access_token,
        }
    }

    pub fn needs_role_selection(&self) -> bool {
        self.role.is_none()
    }

    /// Return the session role if it is one of `allowed`.
    ///
    /// A session without a role is never authorized for a role-gated route.
    pub fn require_role(&self, allowed: &[Role]) -> Result<Role, AppError> {
        let role = self.role.ok_or(AppError::RoleRequired)?;
        if allowed.contains(&role) {
            Ok(role)
        } else {
            Err(AppError::Forbidden(format!(
                "role '{}' may not use this route",
                role
            )))
        }
    }

    /// Backend bearer token, required for any proxied backend call.
    pub fn bearer(&self) -> Result<&str, AppError> {
        self.access_token
            .as_deref()
            .ok_or(AppError::Unauthorized)
    }

    /// Outward projection exposed to UI code.
    pub fn view(&self) -> SessionView {
        SessionView {
            user: self.user.clone(),
            role: self.role,
            gym: self.gym.clone(),
            access_token: self.access_token.clone(),
            needs_role_selection: self.needs_role_selection(),
        }
    }

    pub fn to_claims(&self, iat: usize, exp: usize) -> SessionClaims {
        SessionClaims {
            sub: self.user.id.clone(),
            name: self.user.name.clone(),
            email: self.user.email.clone(),
            role: self.role,
            gym: self.gym.clone(),
            access_token: self.access_token.clone(),
            iat,
            exp,
        }
    }
}

/// JWT claims carrying the full session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (backend user ID)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gym: Option<GymSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
}

impl From<SessionClaims> for Session {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user: SessionUser {
                id: claims.sub,
                name: claims.name,
                email: claims.email,
            },
            role: claims.role,
            gym: claims.gym,
            access_token: claims.access_token,
        }
    }
}

/// Session shape consumed by the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionView {
    pub user: SessionUser,
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gym: Option<GymSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub needs_role_selection: bool,
}
