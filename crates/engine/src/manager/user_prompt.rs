// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `user_prompt` handling: if the runner is streaming and still running,
//! inject the prompt without restarting it; otherwise stop whatever is left
//! of the old runner and spawn a fresh one, resuming its runner session id
//! only when the runner type the new turn picks still matches the one that
//! produced it.

use sylas_core::{AgentId, Clock, Effect, Event, IdGen, RepositoryId, RunnerSessionId, TimerId};
use sylas_storage::AgentRuntimeStatus;
use sylas_tracker::translate::{Message, MessageBody};

use crate::error::RuntimeError;
use crate::procedure::ProcedureTable;

use super::{build_runner_config, select_runner_kind, Manager, LIVENESS_INTERVAL};

impl<C, G> Manager<C, G>
where
    C: Clock + Clone + Send + Sync + 'static,
    G: IdGen + 'static,
{
    pub(super) async fn handle_user_prompt(
        &self,
        repository_id: &RepositoryId,
        message: &Message,
    ) -> Result<(), RuntimeError> {
        let MessageBody::UserPrompt { text, author: _ } = &message.body else {
            unreachable!("dispatch only routes UserPrompt bodies here");
        };

        let repo = self.repository(repository_id)?;
        let procedures = ProcedureTable::embedded();

        let snapshot = {
            let state = self.executor.state();
            let state = state.lock();
            let Some(session) = state.session_for_external_id(&message.session_key) else {
                tracing::warn!(session_key = %message.session_key, "user_prompt for unknown session, dropping");
                return Ok(());
            };
            if session.is_terminal() {
                return Ok(());
            }
            let agent_id = session.current.agent_id.clone();
            let runner_name = session.current.runner_name.clone();
            let still_running = agent_id
                .as_ref()
                .and_then(|id| state.agents.get(&AgentId::new(id.clone())))
                .map(|record| {
                    !matches!(
                        record.status,
                        AgentRuntimeStatus::Exited(_) | AgentRuntimeStatus::Gone | AgentRuntimeStatus::Failed(_)
                    )
                })
                .unwrap_or(false);
            let spec = procedures.spec(&session.subroutine);
            (
                session.id.clone(),
                session.subroutine.clone(),
                session.workspace_path.clone(),
                agent_id,
                runner_name,
                still_running && !spec.single_turn,
                session.resume_runner().map(|(r, id)| (r.to_string(), id.to_string())),
                session.labels.clone(),
            )
        };
        let (
            session_id,
            current_subroutine,
            workspace_path,
            agent_id,
            runner_name,
            streaming_and_running,
            resume,
            labels,
        ) = snapshot;

        if streaming_and_running {
            self.handle_streaming_prompt(
                repository_id,
                repo,
                &session_id,
                text,
                agent_id,
                runner_name,
                &labels,
            )
            .await
        } else {
            self.handle_resumed_prompt(
                repo,
                &session_id,
                &current_subroutine,
                workspace_path,
                agent_id,
                runner_name,
                resume,
                text,
            )
            .await
        }
    }

    async fn handle_streaming_prompt(
        &self,
        repository_id: &RepositoryId,
        repo: &sylas_core::Repository,
        session_id: &str,
        text: &str,
        agent_id: Option<String>,
        runner_name: Option<String>,
        labels: &[String],
    ) -> Result<(), RuntimeError> {
        let procedures = ProcedureTable::embedded();
        let procedure_name = self.resolve_procedure(repo, labels, text).await;
        let initial_subroutine = procedures
            .initial_subroutine(&procedure_name)
            .map_err(|_| RuntimeError::UnknownProcedure(procedure_name.clone()))?
            .to_string();

        let now = self.clock.epoch_ms();
        let mut effects = vec![Effect::Emit {
            event: Event::SessionProcedureReset {
                id: session_id.to_string(),
                procedure_kind: procedure_name,
                procedure_hash: procedures.hash(),
                subroutine: initial_subroutine.clone(),
                reset_at_epoch_ms: now,
            },
        }];

        if let (Some(agent_id), Some(runner_name)) = (agent_id.clone(), runner_name.clone()) {
            effects.push(Effect::Emit {
                event: Event::SubroutineStarted {
                    session_id: session_id.to_string(),
                    subroutine: initial_subroutine,
                    agent_id: Some(AgentId::new(agent_id.clone())),
                    runner_name: Some(runner_name),
                },
            });
            effects.push(Effect::SendToRunner {
                agent_id: AgentId::new(agent_id),
                input: text.to_string(),
            });
        } else {
            tracing::warn!(
                session_id = %session_id,
                "session believed streaming but has no recorded agent, dropping prompt injection"
            );
        }
        effects.push(Effect::SetTimer {
            id: TimerId::liveness(session_id),
            duration: LIVENESS_INTERVAL,
        });

        let _ = repository_id;
        self.apply_effects(effects).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_resumed_prompt(
        &self,
        repo: &sylas_core::Repository,
        session_id: &str,
        current_subroutine: &str,
        workspace_path: Option<std::path::PathBuf>,
        agent_id: Option<String>,
        runner_name: Option<String>,
        resume: Option<(String, String)>,
        text: &str,
    ) -> Result<(), RuntimeError> {
        let procedures = ProcedureTable::embedded();
        let spec = procedures.spec(current_subroutine);
        let Some(workspace_path) = workspace_path else {
            return Err(RuntimeError::InvalidRequest(format!(
                "session {session_id} has no workspace to resume into"
            )));
        };

        let mut effects = Vec::new();
        if let Some(agent_id) = agent_id {
            effects.push(Effect::StopRunner {
                agent_id: AgentId::new(agent_id),
            });
        }

        let runner_name = runner_name.unwrap_or_else(|| select_runner_kind(repo, &[], text, &self.runners));
        let resume_runner_session_id = match resume {
            Some((stored_runner, id)) if stored_runner == runner_name => Some(RunnerSessionId::new(id)),
            Some((stored_runner, _)) => {
                tracing::warn!(
                    session_id = %session_id,
                    stored_runner = %stored_runner,
                    new_runner = %runner_name,
                    "runner type mismatch on resume, discarding override and forcing a fresh session"
                );
                None
            }
            None => None,
        };

        let new_agent_id = AgentId::new(format!("agent-{}", self.ids.next()));
        effects.push(Effect::Emit {
            event: Event::SubroutineStarted {
                session_id: session_id.to_string(),
                subroutine: current_subroutine.to_string(),
                agent_id: Some(new_agent_id.clone()),
                runner_name: Some(runner_name.clone()),
            },
        });
        effects.push(Effect::SpawnRunner {
            agent_id: new_agent_id,
            runner_name,
            session_id: session_id.to_string(),
            workspace_path,
            input: text.to_string(),
            env: repo.env.clone().into_iter().collect(),
            cwd: None,
            streaming: !spec.single_turn,
            resume_runner_session_id,
            runner_config: build_runner_config(repo, &spec),
        });
        effects.push(Effect::SetTimer {
            id: TimerId::liveness(session_id),
            duration: LIVENESS_INTERVAL,
        });

        self.apply_effects(effects).await?;
        Ok(())
    }
}
