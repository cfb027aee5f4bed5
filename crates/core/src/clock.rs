// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so session timing logic can be tested without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time for the engine.
///
/// Every place that would otherwise call `SystemTime::now()` takes `&impl
/// Clock` instead, so tests can pin time with [`FakeClock`] and assert on
/// exact timer/cooldown durations.
pub trait Clock: Send + Sync {
    /// Current time as milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;
}

/// Production clock backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Test clock that only advances when told to.
///
/// Cloning shares the same counter, so a test can hold one handle to
/// advance time and pass another into the code under test.
#[derive(Clone, Default)]
pub struct FakeClock {
    now_ms: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Move the clock forward by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Pin the clock to an exact value.
    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_only_when_told() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.epoch_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.epoch_ms(), 1_500);
    }

    #[test]
    fn fake_clock_clones_share_state() {
        let clock = FakeClock::new(0);
        let other = clock.clone();
        other.advance(42);
        assert_eq!(clock.epoch_ms(), 42);
    }

    #[test]
    fn system_clock_is_nonzero() {
        assert!(SystemClock.epoch_ms() > 0);
    }
}
