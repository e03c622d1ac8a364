// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session resolver tests against an in-process backend.
//!
//! These tests verify that:
//! 1. Sign-in failures come back as typed error codes, never a default role
//! 2. A committed role never changes within a session
//! 3. OAuth sign-in provisions first-time users without a role

use gymdesk::error::AuthErrorCode;
use gymdesk::models::{GymSummary, Role};
use gymdesk::services::{BackendClient, OAuthProfile, SessionResolver};
use std::time::Duration;

mod common;

use common::{session_for, FakeBackend};

fn resolver(backend: &FakeBackend) -> SessionResolver {
    SessionResolver::new(BackendClient::new(&backend.url, Duration::from_secs(5)).unwrap())
}

fn profile(email: &str) -> OAuthProfile {
    OAuthProfile {
        email: email.to_string(),
        name: Some("Robin".to_string()),
        email_verified: Some(true),
    }
}

#[tokio::test]
async fn test_credentials_embed_role_and_gym() {
    let backend = FakeBackend::start().await;
    let gym = GymSummary {
        id: "g1".to_string(),
        name: "Iron Temple".to_string(),
    };
    let user = backend.add_user("sam@example.com", "pw", Some(Role::Client), Some(gym.clone()));

    let session = resolver(&backend)
        .resolve_credentials("  Sam@Example.com ", "pw")
        .await
        .unwrap();

    assert_eq!(session.user.id, user.id);
    assert_eq!(session.role, Some(Role::Client));
    assert_eq!(session.gym, Some(gym));
    assert_eq!(session.access_token.as_deref(), Some("token-u1"));
    assert!(!session.needs_role_selection());
}

#[tokio::test]
async fn test_credentials_unknown_user() {
    let backend = FakeBackend::start().await;

    let err = resolver(&backend)
        .resolve_credentials("nobody@example.com", "pw")
        .await
        .unwrap_err();

    assert_eq!(err.code, AuthErrorCode::UserNotFound);
}

#[tokio::test]
async fn test_credentials_wrong_password() {
    let backend = FakeBackend::start().await;
    backend.add_user("sam@example.com", "pw", Some(Role::Owner), None);

    let err = resolver(&backend)
        .resolve_credentials("sam@example.com", "nope")
        .await
        .unwrap_err();

    assert_eq!(err.code, AuthErrorCode::InvalidCredentials);
}

#[tokio::test]
async fn test_credentials_disabled_account() {
    let backend = FakeBackend::start().await;
    backend.add_user("sam@example.com", "pw", Some(Role::Owner), None);
    backend.disable("sam@example.com");

    let err = resolver(&backend)
        .resolve_credentials("sam@example.com", "pw")
        .await
        .unwrap_err();

    assert_eq!(err.code, AuthErrorCode::AccountDisabled);
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    // Port 9 (discard) is not listening.
    let resolver = SessionResolver::new(
        BackendClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap(),
    );

    let err = resolver
        .resolve_credentials("sam@example.com", "pw")
        .await
        .unwrap_err();

    assert_eq!(err.code, AuthErrorCode::NetworkError);
}

#[tokio::test]
async fn test_role_upgrade_is_monotonic() {
    let backend = FakeBackend::start().await;
    let user = backend.add_user("tess@example.com", "pw", None, None);
    let resolver = resolver(&backend);
    let mut session = session_for(&user);

    resolver.upgrade(&mut session, Role::Trainer).await.unwrap();
    assert_eq!(session.role, Some(Role::Trainer));
    assert_eq!(backend.role_patches(), 1);

    // Same role again: success, no backend call.
    resolver.upgrade(&mut session, Role::Trainer).await.unwrap();
    assert_eq!(backend.role_patches(), 1);

    // Different role: rejected, nothing changes.
    let err = resolver
        .upgrade(&mut session, Role::Owner)
        .await
        .unwrap_err();
    assert_eq!(err.code, AuthErrorCode::RoleAlreadySet);
    assert_eq!(session.role, Some(Role::Trainer));
    assert_eq!(backend.role_patches(), 1);
    assert_eq!(
        backend.user("tess@example.com").unwrap().role,
        Some(Role::Trainer)
    );
}

#[tokio::test]
async fn test_upgrade_unreachable_backend_keeps_session_unchanged() {
    let backend = FakeBackend::start().await;
    let user = backend.add_user("tess@example.com", "pw", None, None);
    let mut session = session_for(&user);
    let resolver = SessionResolver::new(
        BackendClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap(),
    );

    let err = resolver
        .upgrade(&mut session, Role::Client)
        .await
        .unwrap_err();

    assert_eq!(err.code, AuthErrorCode::NetworkError);
    assert_eq!(session.role, None);
    assert_eq!(backend.role_patches(), 0);
}

#[tokio::test]
async fn test_upgrade_timeout_keeps_session_unchanged() {
    let backend = FakeBackend::start().await;
    let user = backend.add_user("tess@example.com", "pw", None, None);
    let mut session = session_for(&user);
    backend.delay_role_patch(Duration::from_millis(500));
    let resolver = SessionResolver::new(
        BackendClient::new(&backend.url, Duration::from_millis(100)).unwrap(),
    );

    let err = resolver
        .upgrade(&mut session, Role::Client)
        .await
        .unwrap_err();

    assert_eq!(err.code, AuthErrorCode::TimeoutError);
    assert_eq!(session.role, None);
}

#[tokio::test]
async fn test_concurrent_upgrade_same_role_succeeds() {
    let backend = FakeBackend::start().await;
    let user = backend.add_user("tess@example.com", "pw", None, None);
    let mut session = session_for(&user);

    // Another tab committed the same role first.
    backend.race_role(Role::Client);
    resolver(&backend)
        .upgrade(&mut session, Role::Client)
        .await
        .unwrap();

    assert_eq!(session.role, Some(Role::Client));
}

#[tokio::test]
async fn test_concurrent_upgrade_different_role_adopts_backend_role() {
    let backend = FakeBackend::start().await;
    let user = backend.add_user("tess@example.com", "pw", None, None);
    let mut session = session_for(&user);

    backend.race_role(Role::Owner);
    let err = resolver(&backend)
        .upgrade(&mut session, Role::Client)
        .await
        .unwrap_err();

    assert_eq!(err.code, AuthErrorCode::RoleAlreadySet);
    assert_eq!(session.role, Some(Role::Owner));
}

#[tokio::test]
async fn test_oauth_first_sign_in_needs_role_selection() {
    let backend = FakeBackend::start().await;

    let session = resolver(&backend)
        .resolve_oauth(&profile("new@example.com"), None)
        .await
        .unwrap();

    assert!(session.needs_role_selection());
    assert_eq!(session.role, None);
    let stored = backend.user("new@example.com").unwrap();
    assert_eq!(stored.role, None);
    assert_eq!(stored.name.as_deref(), Some("Robin"));
    assert_eq!(session.user.id, stored.id);
}

#[tokio::test]
async fn test_oauth_preselected_role_is_committed() {
    let backend = FakeBackend::start().await;

    let session = resolver(&backend)
        .resolve_oauth(&profile("new@example.com"), Some(Role::Owner))
        .await
        .unwrap();

    assert_eq!(session.role, Some(Role::Owner));
    assert_eq!(
        backend.user("new@example.com").unwrap().role,
        Some(Role::Owner)
    );
}

#[tokio::test]
async fn test_oauth_existing_role_ignores_preselection() {
    let backend = FakeBackend::start().await;
    backend.add_user("old@example.com", "pw", Some(Role::Trainer), None);

    let session = resolver(&backend)
        .resolve_oauth(&profile("old@example.com"), Some(Role::Owner))
        .await
        .unwrap();

    assert_eq!(session.role, Some(Role::Trainer));
    assert_eq!(backend.role_patches(), 0);
}

#[tokio::test]
async fn test_refresh_reembeds_gym_but_keeps_role() {
    let backend = FakeBackend::start().await;
    let user = backend.add_user("tess@example.com", "pw", Some(Role::Trainer), None);
    let resolver = resolver(&backend);
    let session = session_for(&user);

    {
        let mut state = backend.state.lock().unwrap();
        let stored = state.users.get_mut("tess@example.com").unwrap();
        stored.gym = Some(GymSummary {
            id: "g9".to_string(),
            name: "Lift Lab".to_string(),
        });
        stored.role = Some(Role::Owner);
    }

    let refreshed = resolver.refresh(&session).await.unwrap();
    assert_eq!(refreshed.gym.unwrap().id, "g9");
    assert_eq!(refreshed.role, Some(Role::Trainer));
}

#[tokio::test]
async fn test_refresh_adopts_role_when_session_has_none() {
    let backend = FakeBackend::start().await;
    let user = backend.add_user("tess@example.com", "pw", None, None);
    let session = session_for(&user);

    backend
        .state
        .lock()
        .unwrap()
        .users
        .get_mut("tess@example.com")
        .unwrap()
        .role = Some(Role::Client);

    let refreshed = resolver(&backend).refresh(&session).await.unwrap();
    assert_eq!(refreshed.role, Some(Role::Client));
}
