// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle events, broadcast to UI layers and embedders.

use serde::{Deserialize, Serialize};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user asked to sign out.
    UserInitiated,
    /// The local token passed its expiry.
    SessionExpired,
    /// The server stopped recognizing the session.
    SessionInvalid,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInitiated => "user_initiated",
            Self::SessionExpired => "session_expired",
            Self::SessionInvalid => "session_invalid",
        }
    }
}

/// Events emitted by the session controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session check is in flight on startup.
    Loading,
    /// The session is established (login, SSO completion, restored cache,
    /// or a heartbeat that re-confirmed the user).
    Authenticated { user_id: String, email: String },
    /// The token entered the warning window; countdown until forced logout.
    Warning { seconds_left: u64 },
    /// A previously published warning no longer applies.
    WarningCleared,
    /// The token was refreshed.
    Refreshed { expires_in_secs: u64 },
    /// The session ended.
    LoggedOut { reason: LogoutReason },
}
