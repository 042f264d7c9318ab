// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-app SSO handshake.
//!
//! Moves an authenticated session to another application origin without
//! shared cookies: mint a short-lived SSO token, exchange it for a one-time
//! session id scoped to the destination app, and redeem that id on the
//! destination. The session id travels in the redirect URL (the only value
//! that can cross origins); the return URL is mirrored into session storage
//! as a same-origin fallback. Handshake state never outlives one handshake
//! and is deleted on both success and failure paths.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::AuthClient;
use crate::error::AuthError;
use crate::platform::{KeyStore, Navigator, Platform};
use crate::sdk::SessionUser;

/// Session-store keys mirroring handshake state on the source origin.
pub const SSO_TARGET_APP_KEY: &str = "sso_target_app";
pub const SSO_RETURN_URL_KEY: &str = "sso_return_url";

/// Registry of applications a session can be handed off to.
#[derive(Debug, Clone, Default)]
pub struct SsoApps {
    login_urls: HashMap<String, String>,
}

impl SsoApps {
    /// Parse `name=login-url` entries (the `--sso-app` flag).
    pub fn parse(entries: &[String]) -> anyhow::Result<Self> {
        let mut login_urls = HashMap::new();
        for entry in entries {
            let (name, url) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("invalid sso app entry (want name=url): {entry}"))?;
            if name.is_empty() || url.is_empty() {
                anyhow::bail!("invalid sso app entry (want name=url): {entry}");
            }
            login_urls.insert(name.to_owned(), url.trim_end_matches('/').to_owned());
        }
        Ok(Self { login_urls })
    }

    pub fn login_url(&self, app: &str) -> Result<&str, AuthError> {
        self.login_urls
            .get(app)
            .map(String::as_str)
            .ok_or_else(|| AuthError::UnknownApp(app.to_owned()))
    }
}

pub struct SsoManager {
    client: Arc<AuthClient>,
    platform: Platform,
    apps: SsoApps,
    settle: std::time::Duration,
}

impl SsoManager {
    pub fn new(
        client: Arc<AuthClient>,
        platform: Platform,
        apps: SsoApps,
        settle: std::time::Duration,
    ) -> Self {
        Self { client, platform, apps, settle }
    }

    /// Build the cross-origin redirect URL for handing this session to
    /// `app`, with `return_url` as the post-login destination over there.
    ///
    /// An unregistered app fails before any network call. Handshake
    /// failures clean up the mirrored state before surfacing.
    pub async fn redirect_url(&self, app: &str, return_url: &str) -> Result<String, AuthError> {
        let login_url = self.apps.login_url(app)?.to_owned();
        match self.negotiate(app).await {
            Ok(session_id) => {
                self.stash_handshake(app, return_url);
                Ok(format!(
                    "{login_url}?session_id={}&returnUrl={}",
                    encode(&session_id),
                    encode(return_url),
                ))
            }
            Err(err) => {
                self.clear_handshake();
                Err(err)
            }
        }
    }

    /// Token-generate and exchange phases on the source origin.
    async fn negotiate(&self, app: &str) -> Result<String, AuthError> {
        let sso = self.client.sso_token().await?;
        if !sso.apps.iter().any(|a| a == app) {
            return Err(AuthError::Sso(format!("token not valid for app {app}")));
        }
        self.client.sdk().sso_exchange(&sso.token, app).await
    }

    /// Complete the handshake on the destination origin.
    ///
    /// Returns `None` both when the current URL is not an SSO landing and
    /// when any step fails — the caller falls back to the normal login form
    /// and never retries automatically. The handshake parameters are
    /// stripped from the URL and the mirrored state deleted on every path.
    pub async fn handle_login(&self) -> Option<SessionUser> {
        let url = self.platform.navigator.current_url();
        let params = query_params(&url);
        // The session id can only arrive in the URL; storage does not cross
        // origins.
        let session_id = params.get("session_id")?.clone();
        let return_url = params
            .get("returnUrl")
            .cloned()
            .or_else(|| self.stashed_return_url())
            .unwrap_or_else(|| "/".to_owned());

        let result = self.client.sdk().sso_complete(&session_id).await;

        // Strip handshake parameters so they never linger in history.
        let clean = strip_query_params(&url, &["session_id", "returnUrl"]);
        self.platform.navigator.replace_url(&clean);
        self.clear_handshake();

        match result {
            Ok(auth) => {
                self.client.adopt_session(&auth);
                if url_path(&return_url) != url_path(&url) {
                    // Let the fresh session's state settle before moving.
                    tokio::time::sleep(self.settle).await;
                    self.platform.navigator.navigate(&return_url);
                }
                Some(auth.user)
            }
            Err(err) => {
                // Logged, never surfaced: the user just sees the login form.
                warn!(err = %err, "sso completion failed");
                None
            }
        }
    }

    fn stash_handshake(&self, app: &str, return_url: &str) {
        for (key, value) in [(SSO_TARGET_APP_KEY, app), (SSO_RETURN_URL_KEY, return_url)] {
            if let Err(e) = self.platform.session.set(key, value) {
                debug!(key, err = %e, "sso state stash failed");
            }
        }
    }

    fn stashed_return_url(&self) -> Option<String> {
        self.platform.session.get(SSO_RETURN_URL_KEY).ok().flatten()
    }

    fn clear_handshake(&self) {
        for key in [SSO_TARGET_APP_KEY, SSO_RETURN_URL_KEY] {
            if let Err(e) = self.platform.session.remove(key) {
                debug!(key, err = %e, "sso state removal failed");
            }
        }
    }
}

// -- URL helpers -------------------------------------------------------------

/// Percent-encode a query component (RFC 3986 unreserved set).
pub fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0xf) as usize]));
            }
        }
    }
    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Decode a percent-encoded query component; `+` reads as a space.
/// Malformed escapes pass through untouched.
pub fn decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Parse the query string of a URL into a map (last occurrence wins).
pub fn query_params(url: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some((_, query)) = url.split_once('?') else {
        return params;
    };
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(decode(key), decode(value));
    }
    params
}

/// Rebuild a URL without the named query parameters, preserving the rest.
pub fn strip_query_params(url: &str, names: &[&str]) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_owned();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split_once('=').map(|(k, _)| k).unwrap_or(pair);
            !names.contains(&decode(key).as_str())
        })
        .filter(|pair| !pair.is_empty())
        .collect();
    if kept.is_empty() {
        base.to_owned()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

/// Path component of a URL: scheme/host and query stripped.
pub fn url_path(url: &str) -> &str {
    let without_query = url.split_once('?').map(|(p, _)| p).unwrap_or(url);
    let after_scheme = match without_query.find("://") {
        Some(idx) => &without_query[idx + 3..],
        None => return if without_query.is_empty() { "/" } else { without_query },
    };
    match after_scheme.find('/') {
        Some(idx) => &after_scheme[idx..],
        None => "/",
    }
}

#[cfg(test)]
#[path = "sso_tests.rs"]
mod tests;
