// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer token record: persistence, expiry classification, lazy deletion.
//!
//! The record is three keys in the persistent store — token, absolute
//! expiry (epoch ms), and warning threshold (ms). A record whose expiry has
//! passed is treated as absent and deleted on the read that notices.
//! Status transitions are observed only by polling; nothing is pushed.

use std::sync::Arc;

use tracing::warn;

use crate::platform::{Clock, KeyStore};

pub const TOKEN_KEY: &str = "porter_jwt_token";
pub const TOKEN_EXPIRY_KEY: &str = "porter_jwt_expiry";
pub const TOKEN_THRESHOLD_KEY: &str = "porter_jwt_threshold";

/// Classification of the stored token against the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Not yet inside the warning threshold.
    Valid,
    /// Inside the threshold window before expiry.
    Warning,
    /// Past expiry, or no token stored.
    Expired,
}

#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Write the token record. Storage failures are logged and skipped; a
    /// partial write degrades to "no token" on the next read.
    pub fn store(&self, token: &str, expires_in_secs: u64, threshold_secs: u64) {
        let expires_at = self.clock.now_ms() + expires_in_secs * 1_000;
        let threshold_ms = threshold_secs * 1_000;
        for (key, value) in [
            (TOKEN_KEY, token.to_owned()),
            (TOKEN_EXPIRY_KEY, expires_at.to_string()),
            (TOKEN_THRESHOLD_KEY, threshold_ms.to_string()),
        ] {
            if let Err(e) = self.store.set(key, &value) {
                warn!(key, err = %e, "failed to store token record key");
            }
        }
    }

    /// Current token, or `None`. An expired record is deleted before
    /// returning `None`.
    pub fn token(&self) -> Option<String> {
        let expires_at = self.expires_at()?;
        if self.clock.now_ms() > expires_at {
            self.clear();
            return None;
        }
        self.read(TOKEN_KEY)
    }

    /// Classify the stored record against the clock.
    pub fn status(&self) -> TokenStatus {
        let Some(expires_at) = self.expires_at() else {
            return TokenStatus::Expired;
        };
        let now = self.clock.now_ms();
        if now > expires_at {
            return TokenStatus::Expired;
        }
        let threshold = self.read(TOKEN_THRESHOLD_KEY).and_then(|v| v.parse().ok()).unwrap_or(0);
        if now > expires_at.saturating_sub(threshold) {
            TokenStatus::Warning
        } else {
            TokenStatus::Valid
        }
    }

    /// Milliseconds until expiry (0 when absent or already expired).
    pub fn remaining_ms(&self) -> u64 {
        self.expires_at().map(|e| e.saturating_sub(self.clock.now_ms())).unwrap_or(0)
    }

    /// True when the token expires within `margin_ms` (or is already gone).
    pub fn expires_within(&self, margin_ms: u64) -> bool {
        self.remaining_ms() <= margin_ms
    }

    /// Delete the whole record. Each key removal is independent.
    pub fn clear(&self) {
        for key in [TOKEN_KEY, TOKEN_EXPIRY_KEY, TOKEN_THRESHOLD_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, err = %e, "failed to remove token record key");
            }
        }
    }

    fn expires_at(&self) -> Option<u64> {
        self.read(TOKEN_EXPIRY_KEY)?.parse().ok()
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, err = %e, "token record read failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
