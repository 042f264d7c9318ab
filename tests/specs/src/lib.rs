// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end session lifecycle scenarios.
//!
//! Spawns an in-process identity backend implementing the platform auth API
//! and wires porter stacks against it over real HTTP. The backend exposes
//! knobs for failure injection (refusing refreshes, revoking sessions) and
//! counters so scenarios can assert on actual round-trips.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use porter::platform::memory::{MemoryCookies, MemoryNavigator, MemoryStore};
use porter::platform::{host::SystemClock, Platform};
use porter::{PorterConfig, Stack};

#[derive(Clone)]
struct UserRecord {
    name: String,
    password: String,
}

#[derive(Clone)]
struct ApiKeyRecord {
    id: String,
    name: String,
}

struct IdState {
    users: Mutex<HashMap<String, UserRecord>>,
    /// Bearer token → user email.
    sessions: Mutex<HashMap<String, String>>,
    /// SSO token → (apps it may be exchanged for, minting user's email).
    sso_tokens: Mutex<HashMap<String, (Vec<String>, String)>>,
    /// One-time session id → user email.
    sso_sessions: Mutex<HashMap<String, String>>,
    api_keys: Mutex<HashMap<String, Vec<ApiKeyRecord>>>,
    /// Apps granted to newly minted SSO tokens.
    apps: Mutex<Vec<String>>,
    /// Lifetime reported for newly minted session tokens, seconds.
    expires_in: AtomicU64,
    /// Remaining refresh calls to reject with 502.
    fail_refresh_remaining: AtomicU32,
    me_calls: AtomicU32,
    refresh_calls: AtomicU32,
}

/// Handle to a running in-process identity backend.
pub struct Identity {
    state: Arc<IdState>,
    pub base_url: String,
}

impl Identity {
    /// Spawn the backend on an ephemeral port.
    pub async fn spawn() -> anyhow::Result<Self> {
        let state = Arc::new(IdState {
            users: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            sso_tokens: Mutex::new(HashMap::new()),
            sso_sessions: Mutex::new(HashMap::new()),
            api_keys: Mutex::new(HashMap::new()),
            apps: Mutex::new(Vec::new()),
            expires_in: AtomicU64::new(1_800),
            fail_refresh_remaining: AtomicU32::new(0),
            me_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
        });

        let router = Router::new()
            .route("/v1/auth/login", post(login))
            .route("/v1/auth/register", post(register))
            .route("/v1/auth/logout", post(logout))
            .route("/v1/auth/me", get(me))
            .route("/v1/auth/refresh", post(refresh))
            .route("/v1/auth/password", post(change_password))
            .route("/v1/auth/keys", get(list_keys).post(create_key))
            .route("/v1/auth/keys/{id}", delete(revoke_key))
            .route("/v1/auth/sso/token", post(sso_token))
            .route("/v1/auth/sso/exchange", post(sso_exchange))
            .route("/v1/auth/sso/complete", post(sso_complete))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self { state, base_url: format!("http://{addr}") })
    }

    pub fn add_user(&self, email: &str, name: &str, password: &str) {
        self.state.users.lock().insert(
            email.to_owned(),
            UserRecord { name: name.to_owned(), password: password.to_owned() },
        );
    }

    /// Server-side invalidation: drop every live session.
    pub fn revoke_all_sessions(&self) {
        self.state.sessions.lock().clear();
    }

    /// Apps granted to SSO tokens minted from now on.
    pub fn set_apps(&self, apps: &[&str]) {
        *self.state.apps.lock() = apps.iter().map(|a| (*a).to_owned()).collect();
    }

    /// Lifetime reported for session tokens minted from now on.
    pub fn set_expires_in(&self, secs: u64) {
        self.state.expires_in.store(secs, Ordering::SeqCst);
    }

    /// Reject the next `n` refresh calls with 502.
    pub fn fail_refreshes(&self, n: u32) {
        self.state.fail_refresh_remaining.store(n, Ordering::SeqCst);
    }

    pub fn me_calls(&self) -> u32 {
        self.state.me_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn live_sessions(&self) -> usize {
        self.state.sessions.lock().len()
    }
}

// -- Handlers ----------------------------------------------------------------

type Reply = (StatusCode, Json<Value>);

fn error_reply(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "error": { "code": status.as_str(), "message": message } })))
}

fn user_value(email: &str, record: &UserRecord) -> Value {
    json!({
        "id": format!("uid-{email}"),
        "email": email,
        "name": record.name,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z",
    })
}

fn mint_session(state: &IdState, email: &str) -> Reply {
    let token = format!("tok-{}", uuid::Uuid::new_v4());
    state.sessions.lock().insert(token.clone(), email.to_owned());
    let users = state.users.lock();
    let Some(record) = users.get(email) else {
        return error_reply(StatusCode::INTERNAL_SERVER_ERROR, "user vanished");
    };
    (
        StatusCode::OK,
        Json(json!({
            "user": user_value(email, record),
            "token": token,
            "expires_in": state.expires_in.load(Ordering::SeqCst),
        })),
    )
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

/// Resolve the bearer token to a live session's user email.
fn authed(state: &IdState, headers: &HeaderMap) -> Result<(String, String), Reply> {
    let Some(token) = bearer(headers) else {
        return Err(error_reply(StatusCode::UNAUTHORIZED, "missing bearer token"));
    };
    match state.sessions.lock().get(&token) {
        Some(email) => Ok((token, email.clone())),
        None => Err(error_reply(StatusCode::UNAUTHORIZED, "unknown session")),
    }
}

async fn login(State(state): State<Arc<IdState>>, Json(body): Json<Value>) -> Reply {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    let password = body["password"].as_str().unwrap_or_default();
    let ok = state.users.lock().get(&email).is_some_and(|u| u.password == password);
    if !ok {
        return error_reply(StatusCode::UNAUTHORIZED, "bad credentials");
    }
    mint_session(&state, &email)
}

async fn register(State(state): State<Arc<IdState>>, Json(body): Json<Value>) -> Reply {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    let name = body["name"].as_str().unwrap_or_default().to_owned();
    let password = body["password"].as_str().unwrap_or_default().to_owned();
    if email.is_empty() || password.is_empty() {
        return error_reply(StatusCode::BAD_REQUEST, "email and password required");
    }
    let mut users = state.users.lock();
    if users.contains_key(&email) {
        return error_reply(StatusCode::CONFLICT, "account exists");
    }
    users.insert(email.clone(), UserRecord { name, password });
    drop(users);
    mint_session(&state, &email)
}

async fn logout(State(state): State<Arc<IdState>>, headers: HeaderMap) -> Reply {
    match authed(&state, &headers) {
        Ok((token, _)) => {
            state.sessions.lock().remove(&token);
            (StatusCode::OK, Json(json!({ "logged_out": true })))
        }
        Err(reply) => reply,
    }
}

async fn me(State(state): State<Arc<IdState>>, headers: HeaderMap) -> Reply {
    state.me_calls.fetch_add(1, Ordering::SeqCst);
    match authed(&state, &headers) {
        Ok((_, email)) => {
            let users = state.users.lock();
            match users.get(&email) {
                Some(record) => {
                    (StatusCode::OK, Json(json!({ "user": user_value(&email, record) })))
                }
                None => error_reply(StatusCode::UNAUTHORIZED, "unknown user"),
            }
        }
        Err(reply) => reply,
    }
}

async fn refresh(State(state): State<Arc<IdState>>, headers: HeaderMap) -> Reply {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_refresh_remaining.load(Ordering::SeqCst) > 0 {
        state.fail_refresh_remaining.fetch_sub(1, Ordering::SeqCst);
        return error_reply(StatusCode::BAD_GATEWAY, "refresh backend unavailable");
    }
    match authed(&state, &headers) {
        Ok((token, email)) => {
            state.sessions.lock().remove(&token);
            mint_session(&state, &email)
        }
        Err(reply) => reply,
    }
}

async fn change_password(
    State(state): State<Arc<IdState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    match authed(&state, &headers) {
        Ok((_, email)) => {
            let current = body["current_password"].as_str().unwrap_or_default();
            let new = body["new_password"].as_str().unwrap_or_default().to_owned();
            let mut users = state.users.lock();
            let Some(record) = users.get_mut(&email) else {
                return error_reply(StatusCode::UNAUTHORIZED, "unknown user");
            };
            if record.password != current {
                return error_reply(StatusCode::FORBIDDEN, "wrong password");
            }
            record.password = new;
            (StatusCode::OK, Json(json!({ "changed": true })))
        }
        Err(reply) => reply,
    }
}

async fn list_keys(State(state): State<Arc<IdState>>, headers: HeaderMap) -> Reply {
    match authed(&state, &headers) {
        Ok((_, email)) => {
            let keys = state.api_keys.lock();
            let list: Vec<Value> = keys
                .get(&email)
                .map(|ks| {
                    ks.iter().map(|k| json!({ "id": k.id, "name": k.name })).collect()
                })
                .unwrap_or_default();
            (StatusCode::OK, Json(json!({ "keys": list })))
        }
        Err(reply) => reply,
    }
}

async fn create_key(
    State(state): State<Arc<IdState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    match authed(&state, &headers) {
        Ok((_, email)) => {
            let name = body["name"].as_str().unwrap_or("default").to_owned();
            let id = format!("key-{}", uuid::Uuid::new_v4());
            state
                .api_keys
                .lock()
                .entry(email)
                .or_default()
                .push(ApiKeyRecord { id: id.clone(), name: name.clone() });
            let secret = format!("sk-{}", uuid::Uuid::new_v4());
            (StatusCode::OK, Json(json!({ "id": id, "name": name, "secret": secret })))
        }
        Err(reply) => reply,
    }
}

async fn revoke_key(
    State(state): State<Arc<IdState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    match authed(&state, &headers) {
        Ok((_, email)) => {
            let mut keys = state.api_keys.lock();
            let owned = keys.entry(email).or_default();
            let before = owned.len();
            owned.retain(|k| k.id != id);
            if owned.len() == before {
                return error_reply(StatusCode::NOT_FOUND, "no such key");
            }
            (StatusCode::OK, Json(json!({ "revoked": true })))
        }
        Err(reply) => reply,
    }
}

async fn sso_token(State(state): State<Arc<IdState>>, headers: HeaderMap) -> Reply {
    match authed(&state, &headers) {
        Ok((_, email)) => {
            let token = format!("sso-{}", uuid::Uuid::new_v4());
            let apps = state.apps.lock().clone();
            state.sso_tokens.lock().insert(token.clone(), (apps.clone(), email));
            (StatusCode::OK, Json(json!({ "token": token, "apps": apps, "expires_in": 60 })))
        }
        Err(reply) => reply,
    }
}

async fn sso_exchange(State(state): State<Arc<IdState>>, Json(body): Json<Value>) -> Reply {
    let token = body["token"].as_str().unwrap_or_default().to_owned();
    let target = body["target_app"].as_str().unwrap_or_default();
    let Some((apps, email)) = state.sso_tokens.lock().remove(&token) else {
        return error_reply(StatusCode::BAD_REQUEST, "unknown or used sso token");
    };
    if !apps.iter().any(|a| a == target) {
        return error_reply(StatusCode::FORBIDDEN, "app not in token scope");
    }
    let session_id = format!("sid-{}", uuid::Uuid::new_v4());
    state.sso_sessions.lock().insert(session_id.clone(), email);
    (StatusCode::OK, Json(json!({ "session_id": session_id })))
}

async fn sso_complete(State(state): State<Arc<IdState>>, Json(body): Json<Value>) -> Reply {
    let session_id = body["session_id"].as_str().unwrap_or_default();
    let Some(email) = state.sso_sessions.lock().remove(session_id) else {
        return error_reply(StatusCode::BAD_REQUEST, "unknown or used session id");
    };
    mint_session(&state, &email)
}

// -- Porter stack helpers ----------------------------------------------------

/// Handles to the in-memory platform pieces a spec drives and inspects.
pub struct SpecHost {
    pub stack: Stack,
    pub platform: Platform,
    pub navigator: Arc<MemoryNavigator>,
    pub local: Arc<MemoryStore>,
    pub session: Arc<MemoryStore>,
    pub shutdown: CancellationToken,
}

/// Assemble a porter stack against `base_url` with an in-memory platform.
///
/// `tweak` adjusts the config (short timer intervals, SSO registry) before
/// assembly.
pub fn spec_host(base_url: &str, tweak: impl FnOnce(&mut PorterConfig)) -> anyhow::Result<SpecHost> {
    let local = Arc::new(MemoryStore::new());
    let session = Arc::new(MemoryStore::new());
    let navigator = Arc::new(MemoryNavigator::new("/"));
    let platform = Platform {
        local: Arc::clone(&local) as _,
        session: Arc::clone(&session) as _,
        cookies: Arc::new(MemoryCookies::new()),
        clock: Arc::new(SystemClock),
        navigator: Arc::clone(&navigator) as _,
    };
    let mut config = PorterConfig { api_url: base_url.to_owned(), ..PorterConfig::default() };
    tweak(&mut config);
    let shutdown = CancellationToken::new();
    let stack = porter::assemble(config, platform.clone(), shutdown.clone())?;
    Ok(SpecHost { stack, platform, navigator, local, session, shutdown })
}

/// Await a condition with a bounded polling loop.
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    for _ in 0..200 {
        if cond() {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    anyhow::bail!("timed out waiting for {what}")
}
