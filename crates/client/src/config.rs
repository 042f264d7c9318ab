// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the porter session client.
#[derive(Debug, Clone, clap::Args)]
pub struct PorterConfig {
    /// Base URL of the platform auth API.
    #[arg(long, default_value = "http://127.0.0.1:8400", env = "PORTER_API_URL")]
    pub api_url: String,

    /// Login route on this origin, used for post-logout redirects.
    #[arg(long, default_value = "/login", env = "PORTER_LOGIN_PATH")]
    pub login_path: String,

    /// Heartbeat interval in milliseconds.
    #[arg(long, default_value_t = 300_000, env = "PORTER_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Token refresh poll interval in milliseconds.
    #[arg(long, default_value_t = 1_500_000, env = "PORTER_REFRESH_POLL_MS")]
    pub refresh_poll_ms: u64,

    /// Expiry warning poll interval in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "PORTER_WARNING_POLL_MS")]
    pub warning_poll_ms: u64,

    /// Minimum time between two non-forced refresh attempts, in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "PORTER_REFRESH_COOLDOWN_MS")]
    pub refresh_cooldown_ms: u64,

    /// Seconds before expiry at which the heartbeat refreshes proactively.
    #[arg(long, default_value_t = 300, env = "PORTER_REFRESH_MARGIN_SECS")]
    pub refresh_margin_secs: u64,

    /// Default warning threshold stored with new tokens, in seconds.
    #[arg(long, default_value_t = 300, env = "PORTER_TOKEN_THRESHOLD_SECS")]
    pub token_threshold_secs: u64,

    /// Maximum age of the cached session user before a full re-check, in
    /// milliseconds.
    #[arg(long, default_value_t = 300_000, env = "PORTER_SESSION_CACHE_TTL_MS")]
    pub session_cache_ttl_ms: u64,

    /// How long a successful current-user result is served from cache, in
    /// milliseconds.
    #[arg(long, default_value_t = 30_000, env = "PORTER_USER_CACHE_TTL_MS")]
    pub user_cache_ttl_ms: u64,

    /// How long a failed current-user result is re-raised from cache, in
    /// milliseconds.
    #[arg(long, default_value_t = 5_000, env = "PORTER_ERROR_CACHE_TTL_MS")]
    pub error_cache_ttl_ms: u64,

    /// Upper bound on the remote logout call, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "PORTER_LOGOUT_TIMEOUT_MS")]
    pub logout_timeout_ms: u64,

    /// Delay before navigating to the SSO return URL, in milliseconds.
    #[arg(long, default_value_t = 500, env = "PORTER_SSO_SETTLE_MS")]
    pub sso_settle_ms: u64,

    /// Registered SSO applications as `name=login-url` pairs.
    #[arg(long = "sso-app", value_name = "NAME=URL", env = "PORTER_SSO_APPS", value_delimiter = ',')]
    pub sso_apps: Vec<String>,

    /// Override the state directory for the file-backed store.
    #[arg(long, env = "PORTER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl PorterConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn refresh_poll_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_poll_ms)
    }

    pub fn warning_poll_interval(&self) -> Duration {
        Duration::from_millis(self.warning_poll_ms)
    }

    pub fn refresh_margin_ms(&self) -> u64 {
        self.refresh_margin_secs * 1_000
    }

    pub fn logout_timeout(&self) -> Duration {
        Duration::from_millis(self.logout_timeout_ms)
    }

    pub fn sso_settle_delay(&self) -> Duration {
        Duration::from_millis(self.sso_settle_ms)
    }
}

impl Default for PorterConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8400".to_owned(),
            login_path: "/login".to_owned(),
            heartbeat_ms: 300_000,
            refresh_poll_ms: 1_500_000,
            warning_poll_ms: 30_000,
            refresh_cooldown_ms: 60_000,
            refresh_margin_secs: 300,
            token_threshold_secs: 300,
            session_cache_ttl_ms: 300_000,
            user_cache_ttl_ms: 30_000,
            error_cache_ttl_ms: 5_000,
            logout_timeout_ms: 10_000,
            sso_settle_ms: 500,
            sso_apps: Vec::new(),
            state_dir: None,
        }
    }
}
