//! Scripted auth backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use inkwell_core::api::{ApiError, AuthBackend};
use inkwell_core::auth::{now_millis, ManagerConfig, SessionManager};
use inkwell_core::models::{AuthResponse, MessageResponse, RefreshResponse, User};
use inkwell_core::store::MemoryStore;
use tokio::sync::Notify;

pub const HOUR: i64 = 3_600_000;
pub const LEAD_MS: i64 = HOUR;

/// How a scripted call should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Backend or network outage
    Outage,
    /// Token rejected by message
    InvalidToken,
    /// HTTP 401
    Unauthorized,
}

impl Failure {
    fn to_error(self) -> ApiError {
        match self {
            Failure::Outage => ApiError::ServerError("mock outage".to_string()),
            Failure::InvalidToken => ApiError::InvalidToken("无效或过期的令牌".to_string()),
            Failure::Unauthorized => ApiError::Unauthorized,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub login: usize,
    pub register: usize,
    pub refresh: usize,
    pub logout: usize,
    pub auth_url: usize,
    pub callback: usize,
}

struct Script {
    login: Result<AuthResponse, Failure>,
    register: Result<AuthResponse, Failure>,
    callback: Result<AuthResponse, Failure>,
    /// Queued refresh outcomes; when empty a fresh token pair is issued
    refresh: VecDeque<Result<RefreshResponse, Failure>>,
    refresh_ttl: i64,
    logout: Result<(), Failure>,
    calls: Calls,
    last_refresh_token: Option<String>,
    last_logout_token: Option<String>,
    /// Issue a new pair on every unscripted refresh and accept only the
    /// latest refresh token
    rotating: bool,
    issued_refresh_token: Option<String>,
}

pub struct MockBackend {
    script: Mutex<Script>,
    /// When set, refresh waits for a notification before answering
    refresh_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, logout waits for a notification before answering
    logout_gate: Mutex<Option<Arc<Notify>>>,
}

pub fn user(name: &str) -> User {
    User {
        id: format!("id-{}", name),
        username: name.to_string(),
        email: format!("{}@example.com", name),
        role: "user".to_string(),
    }
}

/// A complete login-shaped response whose access token lives `ttl` millis
pub fn auth_response(name: &str, ttl: i64) -> AuthResponse {
    AuthResponse {
        user: Some(user(name)),
        access_token: Some(format!("access-{}", name)),
        refresh_token: Some(format!("refresh-{}", name)),
        access_token_expires_at: Some(now_millis() + ttl),
        refresh_token_expires_at: None,
        message: Some("ok".to_string()),
    }
}

pub fn refresh_response(tag: &str, ttl: i64) -> RefreshResponse {
    RefreshResponse {
        access_token: format!("access-{}", tag),
        refresh_token: format!("refresh-{}", tag),
        access_token_expires_at: now_millis() + ttl,
        refresh_token_expires_at: None,
        message: None,
    }
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Script {
                login: Ok(auth_response("ada", 2 * HOUR)),
                register: Ok(AuthResponse {
                    message: Some("注册成功".to_string()),
                    ..Default::default()
                }),
                callback: Ok(auth_response("gmail", 2 * HOUR)),
                refresh: VecDeque::new(),
                refresh_ttl: 2 * HOUR,
                logout: Ok(()),
                calls: Calls::default(),
                last_refresh_token: None,
                last_logout_token: None,
                rotating: false,
                issued_refresh_token: None,
            }),
            refresh_gate: Mutex::new(None),
            logout_gate: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Calls {
        self.script.lock().unwrap().calls
    }

    pub fn set_login(&self, result: Result<AuthResponse, Failure>) {
        self.script.lock().unwrap().login = result;
    }

    pub fn set_register(&self, result: Result<AuthResponse, Failure>) {
        self.script.lock().unwrap().register = result;
    }

    pub fn set_callback(&self, result: Result<AuthResponse, Failure>) {
        self.script.lock().unwrap().callback = result;
    }

    pub fn push_refresh(&self, result: Result<RefreshResponse, Failure>) {
        self.script.lock().unwrap().refresh.push_back(result);
    }

    /// Lifetime of tokens issued by unscripted refreshes
    pub fn set_refresh_ttl(&self, ttl: i64) {
        self.script.lock().unwrap().refresh_ttl = ttl;
    }

    pub fn set_logout(&self, result: Result<(), Failure>) {
        self.script.lock().unwrap().logout = result;
    }

    pub fn last_refresh_token(&self) -> Option<String> {
        self.script.lock().unwrap().last_refresh_token.clone()
    }

    pub fn last_logout_token(&self) -> Option<String> {
        self.script.lock().unwrap().last_logout_token.clone()
    }

    /// Rotate the token pair on every unscripted refresh, rejecting any
    /// refresh token but the most recently issued one
    pub fn rotate_tokens(&self) {
        self.script.lock().unwrap().rotating = true;
    }

    /// Hold refresh responses until the returned notifier fires
    pub fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold logout responses until the returned notifier fires
    pub fn gate_logout(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.logout_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

impl Script {
    /// Remember the refresh token a successful sign-in hands out
    fn issue(&mut self, result: &Result<AuthResponse, Failure>) {
        if let Ok(resp) = result {
            self.issued_refresh_token = resp.refresh_token.clone();
        }
    }

    fn next_refresh(&mut self, refresh_token: &str) -> Result<RefreshResponse, Failure> {
        if let Some(scripted) = self.refresh.pop_front() {
            return scripted;
        }
        if !self.rotating {
            return Ok(refresh_response("refreshed", self.refresh_ttl));
        }
        if self.issued_refresh_token.as_deref() != Some(refresh_token) {
            return Err(Failure::InvalidToken);
        }
        let resp = refresh_response(&format!("rotated-{}", self.calls.refresh), self.refresh_ttl);
        self.issued_refresh_token = Some(resp.refresh_token.clone());
        Ok(resp)
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn login(&self, _email: &str, _password: &str) -> Result<AuthResponse, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.calls.login += 1;
        let result = script.login.clone();
        script.issue(&result);
        result.map_err(Failure::to_error)
    }

    async fn register(
        &self,
        _username: &str,
        _email: &str,
        _password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.calls.register += 1;
        let result = script.register.clone();
        script.issue(&result);
        result.map_err(Failure::to_error)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let result = {
            let mut script = self.script.lock().unwrap();
            script.calls.refresh += 1;
            script.last_refresh_token = Some(refresh_token.to_string());
            script.next_refresh(refresh_token)
        };

        let gate = self.refresh_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result.map_err(Failure::to_error)
    }

    async fn logout(&self, refresh_token: &str) -> Result<MessageResponse, ApiError> {
        let result = {
            let mut script = self.script.lock().unwrap();
            script.calls.logout += 1;
            script.last_logout_token = Some(refresh_token.to_string());
            script.logout
        };

        let gate = self.logout_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
            .map(|_| MessageResponse::default())
            .map_err(Failure::to_error)
    }

    async fn auth_url(&self) -> Result<String, ApiError> {
        self.script.lock().unwrap().calls.auth_url += 1;
        Ok("https://accounts.example.com/o/oauth2/auth?client_id=inkwell".to_string())
    }

    async fn google_callback(&self, _code: &str) -> Result<AuthResponse, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.calls.callback += 1;
        let result = script.callback.clone();
        script.issue(&result);
        result.map_err(Failure::to_error)
    }
}

pub fn manager(backend: &Arc<MockBackend>, store: &Arc<MemoryStore>) -> SessionManager {
    SessionManager::new(backend.clone(), store.clone(), ManagerConfig::default())
}

pub fn manager_with_floor(
    backend: &Arc<MockBackend>,
    store: &Arc<MemoryStore>,
    min_refresh_interval: Duration,
) -> SessionManager {
    SessionManager::new(
        backend.clone(),
        store.clone(),
        ManagerConfig {
            min_refresh_interval,
            ..ManagerConfig::default()
        },
    )
}

/// User and both tokens are all present or all absent
pub fn assert_no_partial_session(manager: &SessionManager) {
    let session = manager.session();
    let present = [
        session.user().is_some(),
        session.access_token().is_some(),
        session.refresh_token().is_some(),
    ];
    assert!(
        present.iter().all(|p| *p) || present.iter().all(|p| !*p),
        "partial session: {:?}",
        session
    );
}

/// Let spawned tasks run until `done` holds
pub async fn wait_until<F: Fn() -> bool>(done: F) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
