// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session controller: owns the authenticated/loading/unauthenticated
//! state, drives the heartbeat/refresh/warning timers, and serializes
//! refresh attempts.
//!
//! Timers are independent intervals with no ordering guarantee relative to
//! each other; a heartbeat and a scheduled refresh may race and are
//! serialized only by the shared in-progress flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cleanup;
use crate::client::AuthClient;
use crate::config::PorterConfig;
use crate::events::{LogoutReason, SessionEvent};
use crate::platform::{Clock, KeyStore, Navigator, Platform};
use crate::sdk::SessionUser;
use crate::token::TokenStatus;

/// Session-store key for the short-lived user cache.
pub const USER_CACHE_KEY: &str = "auth_user_cache";

/// Bumped whenever the cached shape changes; a mismatched entry is
/// discarded unread.
const USER_CACHE_VERSION: u32 = 3;

/// Where the session currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Loading,
    Authenticated(SessionUser),
}

/// Versioned entry in the session-scoped user cache.
#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    user: SessionUser,
    cached_at: u64,
    cache_version: u32,
}

pub struct SessionController {
    client: Arc<AuthClient>,
    platform: Platform,
    config: PorterConfig,
    phase: RwLock<SessionPhase>,
    /// Seconds left until forced logout, when the countdown dialog shows.
    warning: Mutex<Option<u64>>,
    refresh_in_progress: AtomicBool,
    last_refresh_ms: AtomicU64,
    focus: Notify,
    event_tx: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

impl SessionController {
    pub fn new(
        client: Arc<AuthClient>,
        platform: Platform,
        config: PorterConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            client,
            platform,
            config,
            phase: RwLock::new(SessionPhase::Unauthenticated),
            warning: Mutex::new(None),
            refresh_in_progress: AtomicBool::new(false),
            last_refresh_ms: AtomicU64::new(0),
            focus: Notify::new(),
            event_tx,
            shutdown,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.read().clone()
    }

    pub fn user(&self) -> Option<SessionUser> {
        match &*self.phase.read() {
            SessionPhase::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(&*self.phase.read(), SessionPhase::Authenticated(_))
    }

    /// Seconds left on the countdown dialog, when showing.
    pub fn warning_seconds(&self) -> Option<u64> {
        *self.warning.lock()
    }

    /// Establish initial state and spawn the background timers.
    ///
    /// A fresh versioned cache entry authenticates optimistically and
    /// validates in the background; anything else does a full session check
    /// before returning.
    pub async fn start(self: &Arc<Self>) {
        match self.read_session_cache() {
            Some(user) => {
                debug!(user_id = %user.id, "restored session from cache, validating in background");
                self.set_authenticated(user);
                let ctl = Arc::clone(self);
                tokio::spawn(async move {
                    ctl.session_check(true).await;
                });
            }
            None => {
                self.set_phase(SessionPhase::Loading);
                let _ = self.event_tx.send(SessionEvent::Loading);
                self.session_check(false).await;
            }
        }
        self.spawn_timers();
    }

    /// Ask for an immediate heartbeat (tab focus, visibility change).
    pub fn notify_focus(&self) {
        self.focus.notify_one();
    }

    /// Sign in and establish the session state.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionUser, crate::error::AuthError> {
        let user = self.client.login(email, password).await?;
        self.write_session_cache(&user);
        self.set_authenticated(user.clone());
        Ok(user)
    }

    /// Create an account and establish the session state.
    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<SessionUser, crate::error::AuthError> {
        let user = self.client.register(email, name, password).await?;
        self.write_session_cache(&user);
        self.set_authenticated(user.clone());
        Ok(user)
    }

    /// The "stay logged in" action: bypasses the cooldown but still
    /// respects the in-progress guard.
    pub async fn stay_logged_in(&self) -> bool {
        self.try_refresh(true).await
    }

    /// Verify the session against the server.
    ///
    /// `established` distinguishes a background re-validation of an
    /// existing session (failure forces logout) from the initial mount
    /// check (failure just lands in `Unauthenticated`).
    async fn session_check(&self, established: bool) {
        match self.client.current_user().await {
            Ok(user) => {
                self.write_session_cache(&user);
                self.set_authenticated(user);
            }
            Err(err) if established => {
                warn!(err = %err, "session validation failed");
                self.logout(LogoutReason::SessionInvalid).await;
            }
            Err(err) => {
                debug!(err = %err, "no active session");
                self.client.tokens().clear();
                self.clear_session_cache();
                self.set_phase(SessionPhase::Unauthenticated);
            }
        }
    }

    fn spawn_timers(self: &Arc<Self>) {
        // Heartbeat: real server round-trip, plus immediately on focus.
        {
            let ctl = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(ctl.config.heartbeat_interval());
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                interval.tick().await; // immediate first tick; start() already checked
                loop {
                    tokio::select! {
                        _ = ctl.shutdown.cancelled() => break,
                        _ = interval.tick() => {}
                        _ = ctl.focus.notified() => {}
                    }
                    ctl.heartbeat().await;
                }
            });
        }
        // Refresh poll: coarse timer that keeps the token fresh even when
        // heartbeats are failing to observe it.
        {
            let ctl = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(ctl.config.refresh_poll_interval());
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = ctl.shutdown.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                    ctl.token_check(false).await;
                }
            });
        }
        // Warning poll: fine-grained timer that also drives the countdown.
        {
            let ctl = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(ctl.config.warning_poll_interval());
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = ctl.shutdown.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                    ctl.token_check(true).await;
                }
            });
        }
    }

    /// One heartbeat: confirm the session server-side, then refresh
    /// proactively when close to expiry.
    async fn heartbeat(&self) {
        if !self.is_authenticated() {
            return;
        }
        match self.client.current_user().await {
            Err(err) => {
                warn!(err = %err, "heartbeat failed, treating session as invalid");
                self.logout(LogoutReason::SessionInvalid).await;
            }
            Ok(user) => {
                self.write_session_cache(&user);
                self.set_authenticated(user);
                if self.client.tokens().expires_within(self.config.refresh_margin_ms()) {
                    self.try_refresh(false).await;
                }
            }
        }
    }

    /// One token-status check shared by the refresh and warning timers.
    /// The warning timer additionally publishes the countdown.
    async fn token_check(&self, publish_warning: bool) {
        if !self.is_authenticated() {
            return;
        }
        match self.client.tokens().status() {
            TokenStatus::Valid => self.clear_warning(),
            TokenStatus::Expired => {
                self.logout(LogoutReason::SessionExpired).await;
            }
            TokenStatus::Warning => {
                if self.try_refresh(false).await {
                    return;
                }
                if publish_warning && matches!(self.client.tokens().status(), TokenStatus::Warning)
                {
                    let seconds_left = self.client.tokens().remaining_ms() / 1_000;
                    *self.warning.lock() = Some(seconds_left);
                    let _ = self.event_tx.send(SessionEvent::Warning { seconds_left });
                }
            }
        }
    }

    /// Attempt a session refresh, serialized and rate-limited.
    ///
    /// A second caller while one is pending is a silent no-op. `force`
    /// bypasses only the time-based cooldown, never the in-progress guard.
    /// Returns true when a refresh actually succeeded.
    pub async fn try_refresh(&self, force: bool) -> bool {
        if self
            .refresh_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("refresh already in progress");
            return false;
        }

        let now = self.platform.clock.now_ms();
        let last = self.last_refresh_ms.load(Ordering::SeqCst);
        if !force && last != 0 && now.saturating_sub(last) < self.config.refresh_cooldown_ms {
            debug!("refresh cooldown active");
            self.refresh_in_progress.store(false, Ordering::SeqCst);
            return false;
        }

        let result = self.client.refresh_session().await;
        self.refresh_in_progress.store(false, Ordering::SeqCst);

        match result {
            Ok(user) => {
                self.last_refresh_ms.store(now, Ordering::SeqCst);
                self.write_session_cache(&user);
                self.set_authenticated(user);
                self.clear_warning();
                let expires_in_secs = self.client.tokens().remaining_ms() / 1_000;
                let _ = self.event_tx.send(SessionEvent::Refreshed { expires_in_secs });
                true
            }
            Err(err) if err.is_token_expired() => {
                self.logout(LogoutReason::SessionExpired).await;
                false
            }
            Err(err) => {
                warn!(err = %err, "session refresh failed");
                false
            }
        }
    }

    /// End the session: best-effort remote logout, then the local cleanup
    /// sweep always runs so no stale per-user data survives an account
    /// switch. Expiry-driven reasons redirect to the login route.
    pub async fn logout(&self, reason: LogoutReason) {
        info!(reason = reason.as_str(), "logging out");
        self.client.logout().await;
        cleanup::perform_logout_cleanup(&self.platform);
        self.clear_warning();
        self.set_phase(SessionPhase::Unauthenticated);
        let _ = self.event_tx.send(SessionEvent::LoggedOut { reason });
        if reason != LogoutReason::UserInitiated {
            let url = format!("{}?reason={}", self.config.login_path, reason.as_str());
            self.platform.navigator.navigate(&url);
        }
    }

    fn set_authenticated(&self, user: SessionUser) {
        let changed = {
            let mut phase = self.phase.write();
            let changed = !matches!(&*phase, SessionPhase::Authenticated(current) if *current == user);
            *phase = SessionPhase::Authenticated(user.clone());
            changed
        };
        if changed {
            let _ = self
                .event_tx
                .send(SessionEvent::Authenticated { user_id: user.id, email: user.email });
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.write() = phase;
    }

    fn clear_warning(&self) {
        if self.warning.lock().take().is_some() {
            let _ = self.event_tx.send(SessionEvent::WarningCleared);
        }
    }

    /// Read the versioned session cache; returns the user only for a fresh,
    /// version-matched entry. Mismatched or stale entries are removed.
    fn read_session_cache(&self) -> Option<SessionUser> {
        let raw = match self.platform.session.get(USER_CACHE_KEY) {
            Ok(value) => value?,
            Err(e) => {
                warn!(err = %e, "session cache read failed");
                return None;
            }
        };
        let entry: CachedSession = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(err = %e, "unparsable session cache entry");
                self.clear_session_cache();
                return None;
            }
        };
        if entry.cache_version != USER_CACHE_VERSION {
            debug!(
                found = entry.cache_version,
                expected = USER_CACHE_VERSION,
                "session cache version mismatch, discarding"
            );
            self.clear_session_cache();
            return None;
        }
        let age = self.platform.clock.now_ms().saturating_sub(entry.cached_at);
        if age >= self.config.session_cache_ttl_ms {
            self.clear_session_cache();
            return None;
        }
        Some(entry.user)
    }

    fn write_session_cache(&self, user: &SessionUser) {
        let entry = CachedSession {
            user: user.clone(),
            cached_at: self.platform.clock.now_ms(),
            cache_version: USER_CACHE_VERSION,
        };
        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(e) = self.platform.session.set(USER_CACHE_KEY, &json) {
                    warn!(err = %e, "session cache write failed");
                }
            }
            Err(e) => warn!(err = %e, "session cache serialization failed"),
        }
    }

    fn clear_session_cache(&self) {
        if let Err(e) = self.platform.session.remove(USER_CACHE_KEY) {
            warn!(err = %e, "session cache removal failed");
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
