// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Error taxonomy for auth and session operations.
///
/// `TokenExpired` is the distinguished variant: it means the local token is
/// gone or the server answered 401, and callers should log out rather than
/// retry. Everything else is either retryable (`Network`, 5xx `Api`) or a
/// hard failure that must surface immediately (`InvalidResponse`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No usable token, or the server rejected the session (401).
    TokenExpired,
    /// The server answered with a non-success status.
    Api { status: u16, message: String },
    /// The response decoded but failed shape validation (e.g. a user record
    /// without id/email). Never cached, never retried.
    InvalidResponse(String),
    /// SSO target is not a registered application.
    UnknownApp(String),
    /// An SSO handshake step failed.
    Sso(String),
    /// Transport-level failure: DNS, connect, timeout, body read.
    Network(String),
    /// Platform storage failure (quota, permissions).
    Storage(String),
}

impl AuthError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for the distinguished logout-triggering variant.
    pub fn is_token_expired(&self) -> bool {
        matches!(self, Self::TokenExpired)
    }

    /// True for a 403 — a permanent authorization change that must be
    /// re-checked on the next call, so it is never served from cache.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenExpired => f.write_str("session token expired"),
            Self::Api { status, message } => write!(f, "api error ({status}): {message}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            Self::UnknownApp(name) => write!(f, "Unknown app: {name}"),
            Self::Sso(msg) => write!(f, "sso handshake failed: {msg}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
