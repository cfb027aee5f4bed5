// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key async mutex: the session lifecycle manager's serialisation
//! primitive for "messages with the same `session_key` are processed in
//! the order they arrive, but unrelated sessions never block each other."
//!
//! A lock is created lazily on first use and kept alive only while
//! contended; an uncontended key's entry is pruned on release so the map
//! does not grow without bound across a long-running daemon's lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedMutex {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another task already holds
    /// it. The returned guard releases the lock (and, if no one else is
    /// waiting on it, prunes the map entry) on drop.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let entry = {
            let mut locks = self.locks.lock();
            locks.entry(key.to_string()).or_default().clone()
        };
        let guard = entry.clone().lock_owned().await;
        KeyedGuard {
            _guard: guard,
            key: key.to_string(),
            entry,
            locks: &self.locks,
        }
    }
}

pub struct KeyedGuard<'a> {
    _guard: OwnedMutexGuard<()>,
    key: String,
    entry: Arc<AsyncMutex<()>>,
    locks: &'a SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Arc::strong_count of 2 means only the map and this about-to-drop
        // guard reference it; safe to prune without a race, since no other
        // task can have cloned it between the lock above and here while
        // we're still holding the `locks` entry under `SyncMutex`.
        let mut locks = self.locks.lock();
        if Arc::strong_count(&self.entry) <= 2 {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
#[path = "keyed_mutex_tests.rs"]
mod tests;
