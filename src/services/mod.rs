// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - backend access and session resolution.

pub mod backend;
pub mod google;
pub mod resolver;

pub use backend::{BackendCallError, BackendClient};
pub use google::{GoogleOAuth, OAuthProfile};
pub use resolver::SessionResolver;
