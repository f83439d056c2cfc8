//! The session manager: owns the session, persists it and keeps the access
//! token fresh.
//!
//! `SessionManager` is a cheap handle around shared state. Clone it into
//! whatever needs the session; there is no global instance.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::AuthBackend;
use crate::models::{AuthResponse, User};
use crate::store::KeyValueStore;

use super::error::SessionError;
use super::scheduler::{ArmPolicy, Arming, RefreshScheduler};
use super::session::{now_millis, Credentials, Session};

/// Refresh this long before the access token expires
pub const DEFAULT_REFRESH_LEAD: Duration = Duration::from_secs(60 * 60);

/// Floor for a re-armed timer when a freshly refreshed token is already
/// inside the lead window
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    pub refresh_lead: Duration,
    pub min_refresh_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            refresh_lead: DEFAULT_REFRESH_LEAD,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }
}

impl ManagerConfig {
    fn lead(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.refresh_lead.as_millis()).unwrap_or(i64::MAX))
    }
}

struct Inner {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn KeyValueStore>,
    config: ManagerConfig,
    state: watch::Sender<Session>,
    /// Serializes state replacement together with its persistence and arming
    commit: Mutex<()>,
    /// Held for the whole of a refresh so only one runs at a time
    refresh: Mutex<()>,
    scheduler: RefreshScheduler,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager in the loading state and start its refresh worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        store: Arc<dyn KeyValueStore>,
        config: ManagerConfig,
    ) -> Self {
        let (state, _) = watch::channel(Session::loading());
        let (scheduler, ticks) = RefreshScheduler::new();

        let inner = Arc::new(Inner {
            backend,
            store,
            config,
            state,
            commit: Mutex::new(()),
            refresh: Mutex::new(()),
            scheduler,
        });

        tokio::spawn(run_refresh_worker(Arc::downgrade(&inner), ticks));

        Self { inner }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Receiver that sees every session change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Bearer token for other API clients
    pub fn access_token(&self) -> Option<String> {
        self.inner.state.borrow().access_token().map(str::to_owned)
    }

    /// When the pending refresh timer fires (epoch millis), if one is armed
    pub fn scheduled_refresh_at(&self) -> Option<i64> {
        self.inner.scheduler.scheduled_at()
    }

    pub fn config(&self) -> ManagerConfig {
        self.inner.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Hydrate the session from storage.
    ///
    /// Storage failures and incomplete data yield an anonymous session. A
    /// loaded session arms the refresh timer, or is refreshed right away if
    /// its access token is already inside the lead window.
    pub async fn initialize(&self) -> Session {
        let generation = self.inner.scheduler.generation();

        let loaded = match Credentials::load(self.inner.store.as_ref()).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Failed to load stored session, starting signed out");
                None
            }
        };

        let arming = {
            let _guard = self.inner.commit.lock().await;

            if self.inner.scheduler.generation() != generation {
                debug!("Session changed during initialization, keeping the newer one");
                self.inner.state.send_modify(|s| s.is_loading = false);
                None
            } else {
                match loaded {
                    Some(credentials) => {
                        info!(user_id = %credentials.user.id, "Restored stored session");
                        self.inner
                            .state
                            .send_replace(Session::authenticated(credentials.clone()));
                        Some(self.arm(generation, &credentials, ArmPolicy::RefreshIfDue))
                    }
                    None => {
                        debug!("No stored session");
                        self.inner.state.send_replace(Session::anonymous());
                        None
                    }
                }
            }
        };

        if arming.is_some_and(|a| a.is_due()) {
            self.refresh_due_now().await;
        }

        self.session()
    }

    /// Sign in with email and password.
    ///
    /// On failure the current session is left as it was.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let resp = self.inner.backend.login(email, password).await.map_err(|e| {
            warn!(error = %e, "Login failed");
            SessionError::from(e)
        })?;
        self.establish(resp, "login").await
    }

    /// Create an account. If the backend doesn't hand back credentials
    /// straight away, sign in with the same email and password.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        let resp = self
            .inner
            .backend
            .register(username, email, password)
            .await
            .map_err(|e| {
                warn!(error = %e, "Registration failed");
                SessionError::from(e)
            })?;

        if resp.has_credentials() {
            return self.establish(resp, "register").await;
        }

        debug!(message = ?resp.message, "Registration returned no credentials, signing in");
        self.login(email, password).await
    }

    /// OAuth authorization URL to send the user to
    pub async fn auth_url(&self) -> Result<String, SessionError> {
        self.inner.backend.auth_url().await.map_err(|e| {
            warn!(error = %e, "Failed to fetch OAuth URL");
            SessionError::from(e)
        })
    }

    /// Finish an OAuth sign-in with the authorization code
    pub async fn handle_google_callback(&self, code: &str) -> Result<User, SessionError> {
        let resp = self.inner.backend.google_callback(code).await.map_err(|e| {
            warn!(error = %e, "OAuth callback failed");
            SessionError::from(e)
        })?;
        self.establish(resp, "google").await
    }

    /// Sign out. The local session is cleared even when the backend call
    /// fails or there is no refresh token to revoke.
    pub async fn logout(&self) {
        // Disarm before anything else so no refresh starts mid-teardown.
        let generation = self.inner.scheduler.advance_generation();

        let refresh_token = self.inner.state.borrow().refresh_token().map(str::to_owned);
        match refresh_token {
            Some(token) => {
                if let Err(e) = self.inner.backend.logout(&token).await {
                    warn!(error = %e, "Backend logout failed, clearing local session anyway");
                }
            }
            None => debug!("No refresh token held, skipping backend logout"),
        }

        let _guard = self.inner.commit.lock().await;
        if self.inner.scheduler.generation() != generation {
            info!("A newer sign-in replaced the session during logout");
            return;
        }
        self.inner.state.send_replace(Session::anonymous());
        self.persist(None).await;
        info!("Signed out");
    }

    /// Exchange the refresh token for a new token pair.
    ///
    /// Fails without a backend call when no refresh token is held. Only one
    /// refresh runs at a time; a caller that waited on another refresh which
    /// already rotated the token returns without a second backend call. A
    /// rejected refresh token signs the user out; any other failure keeps
    /// the session so a later attempt can succeed.
    pub async fn refresh_token_if_needed(&self) -> Result<(), SessionError> {
        let generation = self.inner.scheduler.generation();
        let Some(seen) = self.current_refresh_token() else {
            debug!("No refresh token held, nothing to refresh");
            return Err(SessionError::NotAuthenticated);
        };

        let _in_flight = self.inner.refresh.lock().await;
        if self.inner.scheduler.generation() != generation {
            debug!("Session changed while waiting to refresh");
            return Err(SessionError::Superseded);
        }
        let Some(refresh_token) = self.current_refresh_token() else {
            return Err(SessionError::Superseded);
        };
        if refresh_token != seen {
            debug!("Token pair already rotated by a concurrent refresh");
            return Ok(());
        }

        let resp = match self.inner.backend.refresh_token(&refresh_token).await {
            Ok(resp) => resp,
            Err(e) if e.is_invalid_token() => {
                let still_held = self.current_refresh_token().as_deref() == Some(refresh_token.as_str());
                if self.inner.scheduler.generation() != generation || !still_held {
                    debug!("Refresh token rejected, but the session already moved on");
                    return Err(SessionError::Superseded);
                }
                warn!(error = %e, "Refresh token rejected, signing out");
                self.logout().await;
                return Err(SessionError::RefreshRejected(e));
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, keeping current session");
                return Err(e.into());
            }
        };

        let now = now_millis();
        let _guard = self.inner.commit.lock().await;
        if self.inner.scheduler.generation() != generation {
            debug!("Discarding refresh result, session changed while it was in flight");
            return Err(SessionError::Superseded);
        }
        let current = self.inner.state.borrow().credentials.clone();
        let Some(mut credentials) = current else {
            return Err(SessionError::Superseded);
        };

        credentials.apply_refresh(resp, now);
        self.inner
            .state
            .send_replace(Session::authenticated(credentials.clone()));
        self.persist(Some(&credentials)).await;
        self.arm(
            generation,
            &credentials,
            ArmPolicy::AtLeast(self.inner.config.min_refresh_interval),
        );

        info!(
            user_id = %credentials.user.id,
            expires_at = ?credentials.access_token_expires_at,
            "Access token refreshed"
        );
        Ok(())
    }

    /// Foreground check: refresh only if the access token is inside the
    /// lead window. Call this when the application resumes.
    pub async fn refresh_if_stale(&self) -> Result<(), SessionError> {
        let session = self.session();
        if !session.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        if !session.needs_refresh(now_millis(), self.inner.config.lead()) {
            debug!("Access token still fresh");
            return Ok(());
        }
        self.refresh_token_if_needed().await
    }

    /// Another API client was told the access token is invalid or expired
    pub async fn handle_unauthorized(&self) {
        warn!("Backend rejected the access token, signing out");
        self.logout().await;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Replace the whole session with a login-shaped response
    async fn establish(&self, resp: AuthResponse, via: &'static str) -> Result<User, SessionError> {
        let Some(credentials) = Credentials::from_auth_response(resp, now_millis()) else {
            warn!(via, "Auth response is missing the user or a token");
            return Err(SessionError::IncompleteResponse(format!(
                "{} response has no complete credential set",
                via
            )));
        };
        let user = credentials.user.clone();

        let arming = {
            let _guard = self.inner.commit.lock().await;
            let generation = self.inner.scheduler.advance_generation();
            self.inner
                .state
                .send_replace(Session::authenticated(credentials.clone()));
            self.persist(Some(&credentials)).await;
            self.arm(generation, &credentials, ArmPolicy::RefreshIfDue)
        };

        info!(user_id = %user.id, via, "Signed in");

        if arming.is_due() {
            self.refresh_due_now().await;
        }
        Ok(user)
    }

    fn current_refresh_token(&self) -> Option<String> {
        self.inner.state.borrow().refresh_token().map(str::to_owned)
    }

    fn arm(&self, generation: u64, credentials: &Credentials, policy: ArmPolicy) -> Arming {
        let now = now_millis();
        let fire_at = credentials.refresh_due_at(self.inner.config.lead(), now);
        self.inner.scheduler.arm(generation, fire_at, now, policy)
    }

    async fn refresh_due_now(&self) {
        debug!("Access token already inside the refresh window, refreshing now");
        if let Err(e) = self.refresh_token_if_needed().await {
            warn!(error = %e, "Immediate token refresh failed");
        }
    }

    /// Storage failures are logged, never surfaced
    async fn persist(&self, credentials: Option<&Credentials>) {
        let store = self.inner.store.as_ref();
        let result = match credentials {
            Some(c) => c.save(store).await,
            None => Credentials::clear(store).await,
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session");
        }
    }
}

/// Runs refreshes requested by the scheduler's timers. Holds only a weak
/// reference so it exits once the last manager handle is dropped.
async fn run_refresh_worker(inner: Weak<Inner>, mut ticks: mpsc::Receiver<u64>) {
    while let Some(generation) = ticks.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let manager = SessionManager { inner };

        if manager.inner.scheduler.generation() != generation {
            debug!(generation, "Ignoring refresh tick from an old session");
            continue;
        }
        if let Err(e) = manager.refresh_token_if_needed().await {
            warn!(error = %e, kind = ?e.kind(), "Scheduled token refresh failed");
        }
    }
    debug!("Refresh worker stopped");
}
