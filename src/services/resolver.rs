// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session/role resolution.
//!
//! On every authentication event the resolver looks up the backend user,
//! and copies role, gym and the backend-issued access token into the
//! session, so later requests carry that context without another lookup.
//! The backend is the source of truth: nothing here keeps state between
//! requests, and no failure ever falls back to a default role.

use crate::error::{AuthError, AuthErrorCode};
use crate::models::{BackendUser, Role, Session, SessionClaims, SessionView};
use crate::services::backend::{BackendCallError, BackendClient};
use crate::services::google::{OAuthProfile, PROVIDER};

/// Resolves and upgrades sessions against the gym backend.
#[derive(Clone)]
pub struct SessionResolver {
    backend: BackendClient,
}

impl SessionResolver {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Credentials sign-in.
    ///
    /// An unknown email is `USER_NOT_FOUND`; credentials flows never
    /// provision users.
    pub async fn resolve_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let email = normalize_email(email);

        let user = self
            .backend
            .get_user_by_email(&email)
            .await
            .map_err(|e| auth_failure("user lookup", &e))?
            .ok_or(AuthError::new(AuthErrorCode::UserNotFound))?;
        ensure_enabled(&user)?;

        let login = self
            .backend
            .login(&email, password)
            .await
            .map_err(|e| match e {
                // The user exists, so a 404 here can only mean bad credentials.
                BackendCallError::Status { status: 404, .. } => {
                    AuthError::new(AuthErrorCode::InvalidCredentials)
                }
                e => auth_failure("credentials login", &e),
            })?;
        ensure_enabled(&login.user)?;

        tracing::info!(
            user_id = %login.user.id,
            role = ?login.user.role,
            "Credentials sign-in resolved"
        );

        Ok(Session::from_backend(&login.user, Some(login.access_token)))
    }

    /// OAuth sign-in.
    ///
    /// A first-time user is provisioned without a role. If the UI already
    /// collected a role before redirecting to the provider, it is applied
    /// through [`SessionResolver::upgrade`]; otherwise the session comes
    /// back with `needs_role_selection`.
    pub async fn resolve_oauth(
        &self,
        profile: &OAuthProfile,
        preselected: Option<Role>,
    ) -> Result<Session, AuthError> {
        let email = normalize_email(&profile.email);

        let existing = self
            .backend
            .get_user_by_email(&email)
            .await
            .map_err(|e| auth_failure("user lookup", &e))?;

        let user = match existing {
            Some(user) => user,
            None => self.provision(profile.display_name(), &email).await?,
        };
        ensure_enabled(&user)?;

        let login = self
            .backend
            .oauth_login(&email, PROVIDER)
            .await
            .map_err(|e| auth_failure("oauth login", &e))?;
        ensure_enabled(&login.user)?;

        let mut session = Session::from_backend(&login.user, Some(login.access_token));

        match (session.role, preselected) {
            (None, Some(role)) => self.upgrade(&mut session, role).await?,
            (None, None) => {
                tracing::info!(user_id = %session.user.id, "OAuth session needs role selection");
            }
            (Some(_), _) => {}
        }

        tracing::info!(
            user_id = %session.user.id,
            role = ?session.role,
            "OAuth sign-in resolved"
        );

        Ok(session)
    }

    /// Re-read the backend user and re-embed gym membership.
    ///
    /// The backend role is adopted only while the session has none; a
    /// committed session role is kept until the actor signs in again.
    pub async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let email = session
            .user
            .email
            .as_deref()
            .ok_or(AuthError::new(AuthErrorCode::UnknownError))?;

        let user = self
            .backend
            .get_user_by_email(email)
            .await
            .map_err(|e| auth_failure("session refresh", &e))?
            .ok_or(AuthError::new(AuthErrorCode::UserNotFound))?;
        ensure_enabled(&user)?;

        let mut refreshed = session.clone();
        refreshed.gym = user.gym.clone();

        match (session.role, user.role) {
            (None, backend_role) => refreshed.role = backend_role,
            (Some(current), Some(backend_role)) if current != backend_role => {
                tracing::warn!(
                    user_id = %session.user.id,
                    session_role = %current,
                    backend_role = %backend_role,
                    "Backend role differs from session role; keeping session role until re-authentication"
                );
            }
            _ => {}
        }

        Ok(refreshed)
    }

    /// Outward session projection. Pure: no backend call.
    pub fn project(claims: SessionClaims) -> SessionView {
        Session::from(claims).view()
    }

    /// Assign a role to a session that has none.
    ///
    /// - same role as already committed: success, nothing changes
    /// - a different committed role: `ROLE_ALREADY_SET`, nothing changes
    /// - no role: committed through the backend, then set on `session`
    ///
    /// Concurrent duplicate attempts are settled by the backend: a conflict
    /// answer is resolved by re-reading the stored role.
    pub async fn upgrade(&self, session: &mut Session, role: Role) -> Result<(), AuthError> {
        match session.role {
            Some(current) if current == role => {
                tracing::debug!(user_id = %session.user.id, %role, "Role already set, upgrade is a no-op");
                return Ok(());
            }
            Some(current) => {
                tracing::warn!(
                    user_id = %session.user.id,
                    current = %current,
                    requested = %role,
                    "Rejected role change"
                );
                return Err(AuthError::new(AuthErrorCode::RoleAlreadySet));
            }
            None => {}
        }

        let committed = match self
            .backend
            .assign_role(session.access_token.as_deref(), &session.user.id, role)
            .await
        {
            Ok(user) => {
                if user.gym.is_some() {
                    session.gym = user.gym;
                }
                user.role.unwrap_or(role)
            }
            Err(e) if e.is_conflict() => self.stored_role(session).await?,
            Err(e) => return Err(auth_failure("role assignment", &e)),
        };

        session.role = Some(committed);

        if committed != role {
            tracing::warn!(
                user_id = %session.user.id,
                committed = %committed,
                requested = %role,
                "Backend already holds a different role"
            );
            return Err(AuthError::new(AuthErrorCode::RoleAlreadySet));
        }

        tracing::info!(user_id = %session.user.id, %role, "Role committed");
        Ok(())
    }

    /// Role the backend has stored for the session's user after a conflict.
    async fn stored_role(&self, session: &Session) -> Result<Role, AuthError> {
        let email = session
            .user
            .email
            .as_deref()
            .ok_or(AuthError::new(AuthErrorCode::RoleAlreadySet))?;

        let user = self
            .backend
            .get_user_by_email(email)
            .await
            .map_err(|e| auth_failure("role re-read", &e))?
            .ok_or(AuthError::new(AuthErrorCode::UserNotFound))?;

        user.role
            .ok_or(AuthError::new(AuthErrorCode::RoleAlreadySet))
    }

    /// Create the provisional user for a first OAuth sign-in. A conflict
    /// means a concurrent sign-in created it first.
    async fn provision(&self, name: &str, email: &str) -> Result<BackendUser, AuthError> {
        tracing::info!(email = %email, "Provisioning OAuth user without role");

        match self.backend.create_oauth_user(name, email, PROVIDER).await {
            Ok(user) => Ok(user),
            Err(e) if e.is_conflict() => self
                .backend
                .get_user_by_email(email)
                .await
                .map_err(|e| auth_failure("user lookup", &e))?
                .ok_or(AuthError::new(AuthErrorCode::UnknownError)),
            Err(e) => Err(auth_failure("user provisioning", &e)),
        }
    }
}

fn ensure_enabled(user: &BackendUser) -> Result<(), AuthError> {
    if user.disabled {
        tracing::warn!(user_id = %user.id, "Sign-in attempt for disabled account");
        return Err(AuthError::new(AuthErrorCode::AccountDisabled));
    }
    Ok(())
}

fn auth_failure(step: &'static str, err: &BackendCallError) -> AuthError {
    let auth = AuthError::from(err);
    tracing::warn!(step, error = %err, code = %auth.code, "Backend call failed during sign-in");
    auth
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
