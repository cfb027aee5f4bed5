// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon shutdown: mark the table shutting down, best-effort-stop every
//! live runner within a bounded deadline, and report whether any session is
//! still running for the `/status` gauge.

use std::time::Duration;

use sylas_core::{AgentId, Clock, Effect, Event, IdGen};

use super::Manager;

impl<C, G> Manager<C, G>
where
    C: Clock + Clone + Send + Sync + 'static,
    G: IdGen + 'static,
{
    /// A point-in-time `(wal_seq, state)` pair for the daemon's checkpoint
    /// task. The seq is read from the WAL rather than tracked separately so
    /// it always matches exactly what's been durably appended.
    pub fn state_snapshot(&self) -> (u64, sylas_storage::MaterializedState) {
        let seq = self.wal.lock().write_seq();
        let state = self.executor.state().lock().clone();
        (seq, state)
    }

    /// Whether any session currently has a runner in flight. Wired into the
    /// ingress layer's `/status` gauge: `busy` iff the webhook gauge is
    /// nonzero OR this returns true.
    pub fn has_running_sessions(&self) -> bool {
        let state = self.executor.state();
        let state = state.lock();
        state
            .agents
            .values()
            .any(|agent| matches!(agent.status, sylas_storage::AgentRuntimeStatus::Spawning | sylas_storage::AgentRuntimeStatus::Working))
    }

    /// Run the shutdown sequence:
    /// 1. Mark the table shutting down (new webhooks still arrive but the
    ///    ingress layer acks-and-drops them once this is observed).
    /// 2. Call `stop` on every live runner.
    /// 3. Await completion or the deadline, whichever comes first.
    ///
    /// Flushing the persistence snapshot and closing the HTTP listener are
    /// the daemon binary's own responsibility once this returns, since they
    /// are process-level concerns this crate doesn't own.
    pub async fn shutdown(self: &std::sync::Arc<Self>, deadline: Duration) {
        self.mark_shutting_down().await;

        let agent_ids: Vec<AgentId> = {
            let state = self.executor.state();
            let state = state.lock();
            state
                .agents
                .iter()
                .filter(|(_, rec)| {
                    matches!(
                        rec.status,
                        sylas_storage::AgentRuntimeStatus::Spawning | sylas_storage::AgentRuntimeStatus::Working
                    )
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        if agent_ids.is_empty() {
            return;
        }

        tracing::info!(count = agent_ids.len(), "stopping live runners for shutdown");
        let stop_all = async {
            for agent_id in agent_ids {
                if let Err(err) = self.apply_effects(vec![Effect::StopRunner { agent_id }]).await {
                    tracing::warn!(error = %err, "failed to stop runner during shutdown");
                }
            }
        };
        if tokio::time::timeout(deadline, stop_all).await.is_err() {
            tracing::warn!("shutdown deadline elapsed before all runners confirmed stopped");
        }
    }

    async fn mark_shutting_down(&self) {
        if let Err(err) = self.apply_effects(vec![Effect::Emit { event: Event::Shutdown }]).await {
            tracing::warn!(error = %err, "failed to record shutdown event");
        }
    }
}
