// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory platform implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::platform::{Clock, CookieJar, KeyStore, Navigator};

/// In-memory key/value store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

/// In-memory cookie jar.
#[derive(Default)]
pub struct MemoryCookies {
    cookies: Mutex<HashMap<String, String>>,
}

impl MemoryCookies {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieJar for MemoryCookies {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.lock().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.cookies.lock().insert(name.to_owned(), value.to_owned());
    }

    fn remove(&self, name: &str) {
        self.cookies.lock().remove(name);
    }

    fn names(&self) -> Vec<String> {
        self.cookies.lock().keys().cloned().collect()
    }
}

/// Manually advanced clock for deterministic expiry tests.
#[derive(Default)]
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self { ms: AtomicU64::new(start_ms) }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}

/// In-memory navigator that records history replacements and navigations.
pub struct MemoryNavigator {
    current: Mutex<String>,
    replaced: Mutex<Vec<String>>,
    visited: Mutex<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(url: &str) -> Self {
        Self {
            current: Mutex::new(url.to_owned()),
            replaced: Mutex::new(Vec::new()),
            visited: Mutex::new(Vec::new()),
        }
    }

    /// Point the navigator at a new current URL (simulates a page load).
    pub fn set_current(&self, url: &str) {
        *self.current.lock() = url.to_owned();
    }

    pub fn replacements(&self) -> Vec<String> {
        self.replaced.lock().clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().clone()
    }
}

impl Navigator for MemoryNavigator {
    fn current_url(&self) -> String {
        self.current.lock().clone()
    }

    fn replace_url(&self, url: &str) {
        *self.current.lock() = url.to_owned();
        self.replaced.lock().push(url.to_owned());
    }

    fn navigate(&self, url: &str) {
        *self.current.lock() = url.to_owned();
        self.visited.lock().push(url.to_owned());
    }
}
