// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI host implementations: system clock, file-backed store, logging
//! navigator.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::platform::{Clock, KeyStore, Navigator};

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Resolve the state directory for porter data.
///
/// Checks `PORTER_STATE_DIR`, then `$XDG_STATE_HOME/porter`,
/// then `$HOME/.local/state/porter`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PORTER_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("porter");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/porter");
    }
    PathBuf::from(".porter")
}

/// JSON-file-backed key/value store with atomic writes (write tmp + rename).
///
/// The whole map is rewritten on every mutation; the store holds a handful
/// of short strings, not bulk data.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`. A missing file is an empty
    /// store; a corrupt file is discarded with a warning.
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "corrupt state file, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    /// Persist the current map atomically.
    ///
    /// Uses a unique temp filename (PID + counter) so concurrent saves
    /// racing on the same `.tmp` file cannot corrupt each other.
    fn save(&self, snapshot: &HashMap<String, String>) -> anyhow::Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let snapshot = {
            let mut entries = self.entries.lock();
            entries.insert(key.to_owned(), value.to_owned());
            entries.clone()
        };
        self.save(&snapshot)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let snapshot = {
            let mut entries = self.entries.lock();
            if entries.remove(key).is_none() {
                return Ok(());
            }
            entries.clone()
        };
        self.save(&snapshot)
    }

    fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

/// Navigator for hosts without a document to move: records the current URL
/// and logs navigation intents.
pub struct LogNavigator {
    current: Mutex<String>,
}

impl LogNavigator {
    pub fn new(url: &str) -> Self {
        Self { current: Mutex::new(url.to_owned()) }
    }
}

impl Navigator for LogNavigator {
    fn current_url(&self) -> String {
        self.current.lock().clone()
    }

    fn replace_url(&self, url: &str) {
        *self.current.lock() = url.to_owned();
    }

    fn navigate(&self, url: &str) {
        *self.current.lock() = url.to_owned();
        info!(url, "navigation requested");
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
