// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host capability layer.
//!
//! Everything porter touches outside its own process — key/value storage,
//! cookies, wall-clock time, navigation — goes through these traits, so the
//! session logic runs unchanged against a browser bridge, a CLI host, or
//! the in-memory fixtures used by tests.

pub mod host;
pub mod memory;

use std::sync::Arc;

/// Milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// A string key/value store. All operations are fallible so quota and
/// permission failures can be caught at every call site and degrade to a
/// skipped cache write or cleanup step.
pub trait KeyStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
    /// Snapshot of all keys currently present.
    fn keys(&self) -> anyhow::Result<Vec<String>>;
}

/// Cookie access for the UI-selection state cleared on logout.
pub trait CookieJar: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn remove(&self, name: &str);
    fn names(&self) -> Vec<String>;
}

/// Location and history control.
pub trait Navigator: Send + Sync {
    /// Full URL of the current document.
    fn current_url(&self) -> String;
    /// Replace the current history entry without triggering navigation.
    fn replace_url(&self, url: &str);
    /// Navigate to a URL.
    fn navigate(&self, url: &str);
}

/// Capability bundle injected into every porter component.
#[derive(Clone)]
pub struct Platform {
    /// Survives restarts (browser localStorage; a JSON file on a CLI host).
    pub local: Arc<dyn KeyStore>,
    /// Scoped to one session/tab; gone when the host exits.
    pub session: Arc<dyn KeyStore>,
    pub cookies: Arc<dyn CookieJar>,
    pub clock: Arc<dyn Clock>,
    pub navigator: Arc<dyn Navigator>,
}

impl Platform {
    /// Fully in-memory platform with the system clock. Used by embedders
    /// and as the base fixture in tests.
    pub fn in_memory() -> Self {
        Self {
            local: Arc::new(memory::MemoryStore::new()),
            session: Arc::new(memory::MemoryStore::new()),
            cookies: Arc::new(memory::MemoryCookies::new()),
            clock: Arc::new(host::SystemClock),
            navigator: Arc::new(memory::MemoryNavigator::new("/")),
        }
    }

    /// CLI host platform: file-backed persistent store under `state_dir`,
    /// in-memory session scope, and a navigator that logs intents.
    pub fn host(state_dir: Option<std::path::PathBuf>) -> anyhow::Result<Self> {
        let dir = state_dir.unwrap_or_else(host::state_dir);
        let local = host::FileStore::open(dir.join("store.json"))?;
        Ok(Self {
            local: Arc::new(local),
            session: Arc::new(memory::MemoryStore::new()),
            cookies: Arc::new(memory::MemoryCookies::new()),
            clock: Arc::new(host::SystemClock),
            navigator: Arc::new(host::LogNavigator::new("/")),
        })
    }
}
