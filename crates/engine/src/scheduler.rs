// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory timer set for the session lifecycle manager.
//!
//! Timers are identified by [`TimerId`] (liveness, idle-grace, cooldown,
//! classifier-gate, exit-deferred — see `sylas_core::timer`) and fire as
//! [`Event::TimerStart`] once the manager's poll loop observes their
//! deadline has passed. Deadlines are tracked in epoch-millisecond space so
//! the whole thing runs off the same [`Clock`] the rest of the manager uses,
//! rather than `Instant`, which would make it untestable with [`FakeClock`].

use std::collections::HashMap;

use sylas_core::{Event, TimerId};

#[derive(Debug, Clone, Copy)]
struct Timer {
    fires_at_ms: u64,
}

/// Tracks pending timers and yields the ones that have fired.
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<TimerId, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer to fire `duration_ms` after `now_ms`. Replaces any
    /// existing timer with the same id.
    pub fn set_timer(&mut self, id: TimerId, duration_ms: u64, now_ms: u64) {
        self.timers.insert(
            id,
            Timer {
                fires_at_ms: now_ms.saturating_add(duration_ms),
            },
        );
    }

    pub fn cancel_timer(&mut self, id: &TimerId) {
        self.timers.remove(id);
    }

    /// Cancel every timer whose id starts with `prefix` — used to clear all
    /// of a session's timers (liveness, idle-grace, ...) in one call when
    /// the session ends.
    pub fn cancel_timers_with_prefix(&mut self, prefix: &str) {
        self.timers.retain(|id, _| !id.as_str().starts_with(prefix));
    }

    /// Drain and return every timer whose deadline is at or before `now_ms`.
    pub fn fired_timers(&mut self, now_ms: u64) -> Vec<Event> {
        let due: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, t)| t.fires_at_ms <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();

        due.into_iter()
            .map(|id| {
                self.timers.remove(&id);
                Event::TimerStart { id }
            })
            .collect()
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.timers.values().map(|t| t.fires_at_ms).min()
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
