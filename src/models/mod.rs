// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod backend;
pub mod qr;
pub mod role;
pub mod session;

pub use backend::{BackendLogin, BackendUser, Envelope};
pub use qr::{AttendanceAction, OnboardingAction, QrAction, QrError};
pub use role::Role;
pub use session::{GymSummary, Session, SessionClaims, SessionUser, SessionView};
