// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Porter: client-side session lifecycle for the platform.
//!
//! Token storage with expiry classification, a caching/deduplicating
//! decorator over the platform auth API, a session controller driving
//! heartbeat/refresh/warning timers, the cross-app SSO handshake, and the
//! logout cleanup sweep. Host access (storage, cookies, clock, navigation)
//! is injected through [`platform::Platform`], so the same logic runs in a
//! browser bridge, the CLI, or tests.

pub mod cleanup;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod sdk;
pub mod session;
pub mod sso;
pub mod token;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use crate::client::AuthClient;
pub use crate::config::PorterConfig;
pub use crate::error::AuthError;
pub use crate::events::{LogoutReason, SessionEvent};
pub use crate::platform::Platform;
pub use crate::sdk::{SdkClient, SessionUser};
pub use crate::session::{SessionController, SessionPhase};
pub use crate::sso::{SsoApps, SsoManager};
pub use crate::token::{TokenStatus, TokenStore};

/// The assembled client stack for one API origin.
pub struct Stack {
    pub client: Arc<AuthClient>,
    pub controller: Arc<SessionController>,
    pub sso: SsoManager,
    pub tokens: TokenStore,
}

/// Wire the components together against a platform and config.
pub fn assemble(
    config: PorterConfig,
    platform: Platform,
    shutdown: CancellationToken,
) -> anyhow::Result<Stack> {
    let sdk = SdkClient::new(&config.api_url);
    let tokens = TokenStore::new(Arc::clone(&platform.local), Arc::clone(&platform.clock));
    let client = Arc::new(AuthClient::new(
        sdk,
        tokens.clone(),
        Arc::clone(&platform.clock),
        &config,
    ));
    let apps = SsoApps::parse(&config.sso_apps)?;
    let sso = SsoManager::new(
        Arc::clone(&client),
        platform.clone(),
        apps,
        config.sso_settle_delay(),
    );
    let controller =
        SessionController::new(Arc::clone(&client), platform, config, shutdown);
    Ok(Stack { client, controller, sso, tokens })
}
