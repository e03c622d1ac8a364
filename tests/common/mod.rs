// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use gymdesk::config::Config;
use gymdesk::middleware::auth::create_session_token;
use gymdesk::models::{BackendUser, GymSummary, Role, Session};
use gymdesk::routes::create_router;
use gymdesk::AppState;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ─── Fake gym backend ────────────────────────────────────────

#[derive(Default)]
pub struct FakeState {
    /// Users keyed by email.
    pub users: HashMap<String, BackendUser>,
    pub passwords: HashMap<String, String>,
    /// Invitation hash per gym id.
    pub gyms: HashMap<String, (String, String)>,
    pub unhealthy: bool,
    /// Role committed by a concurrent writer just before the next PATCH.
    pub role_race: Option<Role>,
    pub resource_hits: HashMap<String, usize>,
    pub resource_delays: HashMap<String, VecDeque<Duration>>,
    pub mutations: Vec<(String, Value)>,
    pub attendance: Vec<(String, String, i64)>,
    pub role_patches: usize,
    /// Delay applied to the next role PATCH.
    pub role_delay: Option<Duration>,
    /// Profile returned by the fake Google userinfo endpoint.
    pub google_email: Option<String>,
    next_id: u32,
}

/// In-process stand-in for the gym backend REST API.
pub struct FakeBackend {
    pub url: String,
    pub state: Arc<Mutex<FakeState>>,
}

#[allow(dead_code)]
impl FakeBackend {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(FakeState::default()));

        let app = Router::new()
            .route("/health", get(health))
            .route("/users/email/{email}", get(user_by_email))
            .route("/users", post(create_user))
            .route("/users/{id}/role", patch(assign_role))
            .route("/auth/login", post(login))
            .route("/auth/oauth", post(oauth_login))
            .route("/attendance", post(attendance).get(resource))
            .route("/gyms/{id}/onboard", post(onboard))
            .route("/oauth/token", post(google_token))
            .route("/oauth/userinfo", get(google_userinfo))
            .fallback(resource)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn add_user(
        &self,
        email: &str,
        password: &str,
        role: Option<Role>,
        gym: Option<GymSummary>,
    ) -> BackendUser {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let user = BackendUser {
            id: format!("u{}", state.next_id),
            name: Some(email.split('@').next().unwrap_or_default().to_string()),
            email: email.to_string(),
            role,
            gym,
            disabled: false,
        };
        state.users.insert(email.to_string(), user.clone());
        state
            .passwords
            .insert(email.to_string(), password.to_string());
        user
    }

    pub fn add_gym(&self, id: &str, name: &str, hash: &str) -> GymSummary {
        self.state
            .lock()
            .unwrap()
            .gyms
            .insert(id.to_string(), (name.to_string(), hash.to_string()));
        GymSummary {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    pub fn user(&self, email: &str) -> Option<BackendUser> {
        self.state.lock().unwrap().users.get(email).cloned()
    }

    pub fn disable(&self, email: &str) {
        if let Some(user) = self.state.lock().unwrap().users.get_mut(email) {
            user.disabled = true;
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().unwrap().unhealthy = !healthy;
    }

    pub fn race_role(&self, role: Role) {
        self.state.lock().unwrap().role_race = Some(role);
    }

    pub fn hits(&self, resource: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .resource_hits
            .get(resource)
            .copied()
            .unwrap_or(0)
    }

    /// Delay the next GET of `resource` by `delay`.
    pub fn delay_next(&self, resource: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .resource_delays
            .entry(resource.to_string())
            .or_default()
            .push_back(delay);
    }

    /// Email the fake Google userinfo endpoint signs in as.
    pub fn set_google_email(&self, email: &str) {
        self.state.lock().unwrap().google_email = Some(email.to_string());
    }

    /// Delay the next role PATCH by `delay`.
    pub fn delay_role_patch(&self, delay: Duration) {
        self.state.lock().unwrap().role_delay = Some(delay);
    }

    pub fn role_patches(&self) -> usize {
        self.state.lock().unwrap().role_patches
    }

    pub fn attendance(&self) -> Vec<(String, String, i64)> {
        self.state.lock().unwrap().attendance.clone()
    }
}

type Shared = State<Arc<Mutex<FakeState>>>;

fn ok(data: Value) -> Response {
    Json(json!({ "msg": "ok", "data": data })).into_response()
}

fn fail(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "msg": "failed", "error": error }))).into_response()
}

fn caller(state: &FakeState, headers: &HeaderMap) -> Option<String> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer token-")?;
    state
        .users
        .values()
        .find(|u| u.id == token)
        .map(|u| u.email.clone())
}

async fn health(State(state): Shared) -> StatusCode {
    if state.lock().unwrap().unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn user_by_email(State(state): Shared, Path(email): Path<String>) -> Response {
    let state = state.lock().unwrap();
    match state.users.get(&email) {
        Some(user) => ok(json!(user)),
        None => fail(StatusCode::NOT_FOUND, "user not found"),
    }
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
    email: String,
}

async fn create_user(State(state): Shared, Json(body): Json<NewUser>) -> Response {
    let mut state = state.lock().unwrap();
    if state.users.contains_key(&body.email) {
        return fail(StatusCode::CONFLICT, "user exists");
    }
    state.next_id += 1;
    let user = BackendUser {
        id: format!("u{}", state.next_id),
        name: Some(body.name),
        email: body.email.clone(),
        role: None,
        gym: None,
        disabled: false,
    };
    state.users.insert(body.email, user.clone());
    ok(json!(user))
}

#[derive(Deserialize)]
struct RoleBody {
    role: Role,
}

async fn assign_role(
    State(state): Shared,
    Path(id): Path<String>,
    Json(body): Json<RoleBody>,
) -> Response {
    let delay = state.lock().unwrap().role_delay.take();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock().unwrap();
    state.role_patches += 1;
    let race = state.role_race.take();
    let Some(user) = state.users.values_mut().find(|u| u.id == id) else {
        return fail(StatusCode::NOT_FOUND, "user not found");
    };
    if let Some(role) = race {
        user.role = Some(role);
    }
    match user.role {
        Some(current) if current != body.role => fail(StatusCode::CONFLICT, "role already set"),
        _ => {
            user.role = Some(body.role);
            ok(json!(user))
        }
    }
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    #[serde(default)]
    password: Option<String>,
}

async fn login(State(state): Shared, Json(body): Json<LoginBody>) -> Response {
    let state = state.lock().unwrap();
    match (state.users.get(&body.email), state.passwords.get(&body.email)) {
        (Some(user), Some(password)) if Some(password) == body.password.as_ref() => {
            ok(json!({ "accessToken": format!("token-{}", user.id), "user": user }))
        }
        _ => fail(StatusCode::UNAUTHORIZED, "invalid credentials"),
    }
}

async fn oauth_login(State(state): Shared, Json(body): Json<LoginBody>) -> Response {
    let state = state.lock().unwrap();
    match state.users.get(&body.email) {
        Some(user) => ok(json!({ "accessToken": format!("token-{}", user.id), "user": user })),
        None => fail(StatusCode::NOT_FOUND, "user not found"),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceBody {
    gym_id: String,
    timestamp: i64,
}

async fn attendance(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<AttendanceBody>,
) -> Response {
    let mut state = state.lock().unwrap();
    let Some(email) = caller(&state, &headers) else {
        return fail(StatusCode::UNAUTHORIZED, "missing token");
    };
    let user_id = state.users[&email].id.clone();
    state
        .attendance
        .push((user_id, body.gym_id.clone(), body.timestamp));
    ok(json!({ "recorded": true, "gymId": body.gym_id }))
}

#[derive(Deserialize)]
struct OnboardBody {
    hash: String,
}

async fn onboard(
    State(state): Shared,
    Path(gym_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<OnboardBody>,
) -> Response {
    let mut state = state.lock().unwrap();
    let Some(email) = caller(&state, &headers) else {
        return fail(StatusCode::UNAUTHORIZED, "missing token");
    };
    let Some((name, hash)) = state.gyms.get(&gym_id).cloned() else {
        return fail(StatusCode::NOT_FOUND, "gym not found");
    };
    if hash != body.hash {
        return fail(StatusCode::FORBIDDEN, "invalid invitation");
    }
    if let Some(user) = state.users.get_mut(&email) {
        user.gym = Some(GymSummary { id: gym_id, name });
    }
    ok(json!({ "joined": true }))
}

async fn google_token() -> Json<Value> {
    Json(json!({ "access_token": "google-token", "token_type": "Bearer" }))
}

async fn google_userinfo(State(state): Shared) -> Response {
    let state = state.lock().unwrap();
    match &state.google_email {
        Some(email) => Json(json!({
            "email": email,
            "name": "Robin",
            "email_verified": true
        }))
        .into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

/// Generic resources: GET echoes a per-resource hit counter, POST records
/// the mutation. The token `expired` is always refused.
async fn resource(
    State(state): Shared,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().trim_start_matches('/').to_string();

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if bearer == Some("Bearer expired") {
        return fail(StatusCode::UNAUTHORIZED, "token expired");
    }

    if method == Method::POST {
        let value = serde_json::from_str(&body).unwrap_or(Value::Null);
        state.lock().unwrap().mutations.push((path.clone(), value));
        return ok(json!({ "saved": path }));
    }

    let (hit, delay) = {
        let mut state = state.lock().unwrap();
        let hits = state.resource_hits.entry(path.clone()).or_default();
        *hits += 1;
        let hit = *hits;
        let delay = state
            .resource_delays
            .get_mut(&path)
            .and_then(|d| d.pop_front());
        (hit, delay)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    ok(json!({ "resource": path, "hit": hit, "query": uri.query() }))
}

// ─── App helpers ─────────────────────────────────────────────

/// Config pointing at `backend_url` with a private cache directory.
#[allow(dead_code)]
pub fn test_config(backend_url: &str, cache_dir: &FsPath) -> Config {
    let mut config = Config::test_default();
    config.backend_url = backend_url.to_string();
    config.cache.dir = cache_dir.to_path_buf();
    config.backend_timeout = Duration::from_secs(5);
    config.google_token_url = format!("{}/oauth/token", backend_url);
    config.google_userinfo_url = format!("{}/oauth/userinfo", backend_url);
    config
}

/// Create a test app backed by `backend`.
/// Returns the router, the shared state and the cache directory guard.
#[allow(dead_code)]
pub async fn create_test_app(backend: &FakeBackend) -> (Router, Arc<AppState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&backend.url, dir.path());
    let state = Arc::new(AppState::new(config).await.unwrap());
    (create_router(state.clone()), state, dir)
}

/// Session for a backend user, as the resolver would build it.
#[allow(dead_code)]
pub fn session_for(user: &BackendUser) -> Session {
    Session::from_backend(user, Some(format!("token-{}", user.id)))
}

#[allow(dead_code)]
pub fn token_for(state: &AppState, session: &Session) -> String {
    create_session_token(
        session,
        &state.config.session_signing_key,
        Duration::from_secs(3600),
    )
    .unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
