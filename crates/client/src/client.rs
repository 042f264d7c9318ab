// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caching, deduplicating decorator over the SDK client.
//!
//! Wraps [`SdkClient`] with the session policy layer: a short-TTL cache for
//! the current-user check, single-flight sharing of concurrent calls, 401
//! detection that tears down local state, bounded retries for session
//! refresh, and best-effort logout.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::PorterConfig;
use crate::error::AuthError;
use crate::platform::Clock;
use crate::sdk::{ApiKeyInfo, AuthResponse, CreatedApiKey, SdkClient, SessionUser, SsoTokenResponse};
use crate::token::TokenStore;

/// Total refresh attempts before the last error surfaces.
const REFRESH_ATTEMPTS: u32 = 3;
const REFRESH_BACKOFF_BASE_MS: u64 = 1_000;
/// Jitter fraction added on top of each backoff step.
const REFRESH_JITTER: f64 = 0.3;

type SharedUserResult = Result<SessionUser, Arc<AuthError>>;
type InflightUser = Shared<BoxFuture<'static, SharedUserResult>>;

/// Result and in-flight caches for the current-user check.
///
/// One pending future at a time: concurrent callers attach to the shared
/// handle instead of re-issuing the request.
#[derive(Default)]
struct CacheState {
    user: Mutex<Option<(SessionUser, u64)>>,
    error: Mutex<Option<(Arc<AuthError>, u64)>>,
    inflight: Mutex<Option<InflightUser>>,
}

pub struct AuthClient {
    sdk: SdkClient,
    tokens: TokenStore,
    clock: Arc<dyn Clock>,
    cache: Arc<CacheState>,
    user_ttl_ms: u64,
    error_ttl_ms: u64,
    logout_timeout: Duration,
    token_threshold_secs: u64,
}

impl AuthClient {
    pub fn new(
        sdk: SdkClient,
        tokens: TokenStore,
        clock: Arc<dyn Clock>,
        config: &PorterConfig,
    ) -> Self {
        Self {
            sdk,
            tokens,
            clock,
            cache: Arc::new(CacheState::default()),
            user_ttl_ms: config.user_cache_ttl_ms,
            error_ttl_ms: config.error_cache_ttl_ms,
            logout_timeout: config.logout_timeout(),
            token_threshold_secs: config.token_threshold_secs,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn sdk(&self) -> &SdkClient {
        &self.sdk
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser, AuthError> {
        let auth = self.sdk.login(email, password).await?;
        self.adopt_session(&auth);
        Ok(auth.user)
    }

    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<SessionUser, AuthError> {
        let auth = self.sdk.register(email, name, password).await?;
        self.adopt_session(&auth);
        Ok(auth.user)
    }

    /// Store the token record and prime the user cache from an auth payload.
    pub(crate) fn adopt_session(&self, auth: &AuthResponse) {
        self.tokens.store(&auth.token, auth.expires_in, self.token_threshold_secs);
        let now = self.clock.now_ms();
        *self.cache.user.lock() = Some((auth.user.clone(), now));
        *self.cache.error.lock() = None;
    }

    /// Current user, with caching and single-flight deduplication.
    ///
    /// A successful result is served from cache for the configured TTL; a
    /// failure is re-raised from cache for its (shorter) TTL, except 403
    /// which is never cached. While a request is in flight, every caller
    /// awaits the same future.
    pub async fn current_user(&self) -> Result<SessionUser, AuthError> {
        let now = self.clock.now_ms();
        if let Some((user, at)) = self.cache.user.lock().clone() {
            if now.saturating_sub(at) < self.user_ttl_ms {
                return Ok(user);
            }
        }
        if let Some((err, at)) = self.cache.error.lock().clone() {
            if now.saturating_sub(at) < self.error_ttl_ms {
                return Err((*err).clone());
            }
        }
        let fut = {
            let mut slot = self.cache.inflight.lock();
            match &*slot {
                Some(fut) => fut.clone(),
                None => {
                    let fut = self.fetch_current_user();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };
        fut.await.map_err(|e| (*e).clone())
    }

    /// Build the shared fetch future. It populates exactly one of the two
    /// caches on completion and releases the in-flight slot.
    fn fetch_current_user(&self) -> InflightUser {
        let sdk = self.sdk.clone();
        let tokens = self.tokens.clone();
        let clock = Arc::clone(&self.clock);
        let cache = Arc::clone(&self.cache);
        async move {
            let result = match tokens.token() {
                None => Err(AuthError::TokenExpired),
                Some(token) => match sdk.me(&token).await {
                    Ok(user) => Ok(user),
                    Err(err) if err.status() == Some(401) => {
                        // The server rejected the session: drop local state
                        // so callers log out instead of retrying.
                        tokens.clear();
                        *cache.user.lock() = None;
                        Err(AuthError::TokenExpired)
                    }
                    Err(err) => Err(err),
                },
            };
            let now = clock.now_ms();
            let shared = match result {
                Ok(user) => {
                    *cache.user.lock() = Some((user.clone(), now));
                    *cache.error.lock() = None;
                    Ok(user)
                }
                Err(err) => {
                    let err = Arc::new(err);
                    // 403 signals a permanent authorization change that must
                    // be re-checked on the next call.
                    if !err.is_forbidden() {
                        *cache.error.lock() = Some((Arc::clone(&err), now));
                    }
                    Err(err)
                }
            };
            *cache.inflight.lock() = None;
            shared
        }
        .boxed()
        .shared()
    }

    /// Exchange the current token for a fresh one.
    ///
    /// Transient failures retry with exponential backoff and jitter; a 401
    /// is final and tears down local state; validation errors surface
    /// immediately.
    pub async fn refresh_session(&self) -> Result<SessionUser, AuthError> {
        let mut last_err = AuthError::Network("session refresh failed".to_owned());
        for attempt in 0..REFRESH_ATTEMPTS {
            let Some(token) = self.tokens.token() else {
                return Err(AuthError::TokenExpired);
            };
            match self.sdk.refresh(&token).await {
                Ok(auth) => {
                    self.adopt_session(&auth);
                    return Ok(auth.user);
                }
                Err(err) if err.status() == Some(401) => {
                    self.clear_cached();
                    self.tokens.clear();
                    return Err(AuthError::TokenExpired);
                }
                Err(err @ AuthError::InvalidResponse(_)) => return Err(err),
                Err(err) => {
                    warn!(attempt, err = %err, "session refresh attempt failed");
                    last_err = err;
                    if attempt + 1 < REFRESH_ATTEMPTS {
                        tokio::time::sleep(backoff_with_jitter(attempt)).await;
                    }
                }
            }
        }
        Err(last_err)
    }

    /// Best-effort logout. The remote call is bounded by a timeout; local
    /// token and cache clearing always proceeds.
    pub async fn logout(&self) {
        let token = self.tokens.token();
        if let Some(ref token) = token {
            match tokio::time::timeout(self.logout_timeout, self.sdk.logout(token)).await {
                Ok(Ok(())) => debug!("remote logout acknowledged"),
                Ok(Err(e)) => debug!(err = %e, "remote logout failed"),
                Err(_) => warn!("remote logout timed out"),
            }
        }
        self.clear_cached();
        self.tokens.clear();
        // Confirm the server also considers the session ended. Rejection is
        // the expected outcome and is swallowed.
        if let Some(token) = token {
            match self.sdk.me(&token).await {
                Ok(_) => warn!("server session still active after logout"),
                Err(e) => debug!(err = %e, "post-logout session check rejected"),
            }
        }
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let token = self.bearer()?;
        self.sdk
            .change_password(&token, current_password, new_password)
            .await
            .map_err(|e| self.on_auth_error(e))
    }

    pub async fn api_keys(&self) -> Result<Vec<ApiKeyInfo>, AuthError> {
        let token = self.bearer()?;
        self.sdk.list_api_keys(&token).await.map_err(|e| self.on_auth_error(e))
    }

    pub async fn create_api_key(&self, name: &str) -> Result<CreatedApiKey, AuthError> {
        let token = self.bearer()?;
        self.sdk.create_api_key(&token, name).await.map_err(|e| self.on_auth_error(e))
    }

    pub async fn revoke_api_key(&self, id: &str) -> Result<(), AuthError> {
        let token = self.bearer()?;
        self.sdk.revoke_api_key(&token, id).await.map_err(|e| self.on_auth_error(e))
    }

    /// Mint an SSO token for the current session (used by the SSO manager).
    pub async fn sso_token(&self) -> Result<SsoTokenResponse, AuthError> {
        let token = self.bearer()?;
        self.sdk.sso_token(&token).await.map_err(|e| self.on_auth_error(e))
    }

    /// Drop both result caches. The token record is cleared separately.
    pub fn clear_cached(&self) {
        *self.cache.user.lock() = None;
        *self.cache.error.lock() = None;
    }

    fn bearer(&self) -> Result<String, AuthError> {
        self.tokens.token().ok_or(AuthError::TokenExpired)
    }

    /// Collapse a 401 into the distinguished logout-triggering error and
    /// tear down local state.
    fn on_auth_error(&self, err: AuthError) -> AuthError {
        if err.status() == Some(401) {
            self.clear_cached();
            self.tokens.clear();
            AuthError::TokenExpired
        } else {
            err
        }
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = REFRESH_BACKOFF_BASE_MS * 2u64.pow(attempt);
    let jitter = (base as f64 * rand::rng().random_range(0.0..REFRESH_JITTER)) as u64;
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
