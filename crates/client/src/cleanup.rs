// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logout cleanup: removes every per-user cookie and storage key so nothing
//! stale survives an account switch. Each removal is independently guarded;
//! one failure never blocks the rest.

use tracing::warn;

use crate::platform::{CookieJar, KeyStore, Platform};

/// UI-selection cookies cleared on logout.
pub const LOGOUT_COOKIES: &[&str] = &["selected-graph", "credit-visibility"];

/// Per-user key prefixes swept from both stores.
pub const SWEEP_PREFIXES: &[&str] =
    &["saved_queries_", "query_history_", "graph_", "user_", "auth_", "temp_"];

/// Extra prefixes for the persistent store (the token record).
const LOCAL_PREFIXES: &[&str] = &["porter_jwt_"];

/// Extra prefixes for the session store (SSO handshake fallback state).
const SESSION_PREFIXES: &[&str] = &["sso_"];

pub fn perform_logout_cleanup(platform: &Platform) {
    for name in LOGOUT_COOKIES {
        platform.cookies.remove(name);
    }
    sweep(&*platform.local, &[SWEEP_PREFIXES, LOCAL_PREFIXES], "local");
    sweep(&*platform.session, &[SWEEP_PREFIXES, SESSION_PREFIXES], "session");
}

fn sweep(store: &dyn KeyStore, prefix_sets: &[&[&str]], scope: &str) {
    let keys = match store.keys() {
        Ok(keys) => keys,
        Err(e) => {
            warn!(scope, err = %e, "cleanup could not enumerate keys");
            return;
        }
    };
    for key in keys {
        let matches = prefix_sets.iter().flat_map(|set| set.iter()).any(|p| key.starts_with(p));
        if !matches {
            continue;
        }
        if let Err(e) = store.remove(&key) {
            warn!(scope, key, err = %e, "cleanup removal failed");
        }
    }
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
