// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer expiry handling for the session lifecycle manager.
//!
//! [`super::Manager::poll_timers`] drains fired timers from the
//! [`crate::scheduler::Scheduler`] every tick and hands each one here. The
//! only timer currently armed anywhere in the manager is the liveness timer
//! (armed on session start and on every observed runner event, see
//! `session_start`, `user_prompt` and `runner_events`); idle-grace,
//! classifier-gate, cooldown and exit-deferred timer ids are recognised for
//! forward compatibility (and are cancelled defensively in `stop`) but
//! nothing arms them yet, so they fall through to a logged no-op below.

use sylas_core::{Clock, Effect, Event, IdGen, TimerId};
use sylas_storage::AgentRuntimeStatus;

use crate::error::RuntimeError;

use super::{Manager, LIVENESS_INTERVAL};

impl<C, G> Manager<C, G>
where
    C: Clock + Clone + Send + Sync + 'static,
    G: IdGen + 'static,
{
    pub(super) async fn handle_timer_fired(&self, event: Event) -> Result<(), RuntimeError> {
        let Event::TimerStart { id } = event else {
            return Ok(());
        };

        if id.is_liveness() {
            return self.handle_liveness_timer(&id).await;
        }
        if id.is_idle_grace() || id.is_classifier_gate() || id.is_cooldown() || id.is_exit_deferred() {
            tracing::debug!(timer_id = %id, "timer fired with no handler wired up, ignoring");
            return Ok(());
        }

        tracing::warn!(timer_id = %id, "fired timer with unrecognised id shape, ignoring");
        Ok(())
    }

    /// A liveness timer firing means 45s passed with no runner event for the
    /// session's current agent. There is nothing pathological about this on
    /// its own (the runner may simply be thinking), so this only re-arms the
    /// watchdog for a session that is still genuinely in flight; a session
    /// that already ended or whose agent already exited just lets the timer
    /// lapse without rescheduling it.
    async fn handle_liveness_timer(&self, id: &TimerId) -> Result<(), RuntimeError> {
        let Some(session_id) = id.session_id_str() else {
            return Ok(());
        };

        let still_running = {
            let state = self.executor.state();
            let state = state.lock();
            let Some(session) = state.get_session(session_id) else {
                return Ok(());
            };
            if session.is_terminal() {
                return Ok(());
            }
            session
                .current
                .agent_id
                .clone()
                .and_then(|agent_id| state.agents.get(&sylas_core::AgentId::new(agent_id)).cloned())
                .map(|record| {
                    !matches!(
                        record.status,
                        AgentRuntimeStatus::Exited(_) | AgentRuntimeStatus::Gone | AgentRuntimeStatus::Failed(_)
                    )
                })
                .unwrap_or(false)
        };

        if !still_running {
            return Ok(());
        }

        tracing::debug!(session_id, "liveness check passed, no runner event in the last interval");
        self.apply_effects(vec![Effect::SetTimer {
            id: TimerId::liveness(session_id),
            duration: LIVENESS_INTERVAL,
        }])
        .await?;
        Ok(())
    }
}
