// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `stop_signal` and `unassign` handling: call stop on the runner, mark the
//! session ended, save state. Both messages take the same action; an
//! `unassign` following another `unassign` (or a `stop_signal` after the
//! session already ended) is an idempotent no-op.

use sylas_core::{AgentId, Clock, Effect, Event, IdGen, RepositoryId, TimerId};
use sylas_tracker::translate::Message;

use crate::error::RuntimeError;

use super::Manager;

impl<C, G> Manager<C, G>
where
    C: Clock + Clone + Send + Sync + 'static,
    G: IdGen + 'static,
{
    pub(super) async fn handle_stop(
        &self,
        repository_id: &RepositoryId,
        message: &Message,
    ) -> Result<(), RuntimeError> {
        let _ = repository_id;
        self.stop_session(&message.session_key).await
    }

    pub(super) async fn handle_unassign(
        &self,
        repository_id: &RepositoryId,
        message: &Message,
    ) -> Result<(), RuntimeError> {
        let _ = repository_id;
        self.stop_session(&message.session_key).await
    }

    async fn stop_session(&self, external_session_id: &str) -> Result<(), RuntimeError> {
        let (session_id, agent_id) = {
            let state = self.executor.state();
            let state = state.lock();
            let Some(session) = state.session_for_external_id(external_session_id) else {
                return Ok(());
            };
            if session.is_terminal() {
                return Ok(());
            }
            let agent_id = session.current.agent_id.clone().map(AgentId::new);
            (session.id.clone(), agent_id)
        };

        let mut effects = vec![
            Effect::CancelTimer {
                id: TimerId::liveness(&session_id),
            },
            Effect::CancelTimer {
                id: TimerId::idle_grace(&session_id),
            },
            Effect::CancelTimer {
                id: TimerId::classifier_gate(&session_id),
            },
        ];
        if let Some(agent_id) = agent_id {
            effects.push(Effect::StopRunner { agent_id });
        }
        effects.push(Effect::Emit {
            event: Event::SessionStop { id: session_id },
        });

        self.apply_effects(effects).await?;
        Ok(())
    }
}
