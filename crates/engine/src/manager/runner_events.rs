// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner event dispatch: the activity relay and the procedure-advancement
//! logic that runs once a runner's turn ends.
//!
//! Every event is tagged only with the [`AgentId`] that produced it; the
//! session it belongs to is resolved through `MaterializedState::agents` on
//! each call rather than cached, since an agent's session assignment never
//! changes after `SubroutineStarted` first records it. Events for an agent
//! the manager no longer recognises (a stop raced the runner's own exit) are
//! dropped rather than treated as an error.

use std::sync::Arc;

use serde::Deserialize;
use sylas_core::{AgentError, AgentId, Clock, Effect, Event, IdGen, Repository, RepositoryId, RunnerSessionId, Session, TimerId};
use sylas_runners::RunnerEvent;

use crate::error::RuntimeError;
use crate::procedure::{Outcome, ProcedureTable};

use super::{build_runner_config, select_runner_kind, Manager, LIVENESS_INTERVAL};

/// Tool names whose output, once it resolves to a screenshot/recording file,
/// earns a follow-up instruction nudging the runner to upload it through the
/// tracker's attachment tool.
const SCREENSHOT_TOOLS: [&str; 4] = [
    "playwright_screenshot",
    "mcp__claude-in-chrome__computer",
    "mcp__claude-in-chrome__gif_creator",
    "mcp__chrome-devtools__take_screenshot",
];

/// The `{pass, reason}` structured output a `uses_validation_loop` subroutine
/// is expected to emit as its final assistant text.
#[derive(Debug, Deserialize)]
struct ValidationOutput {
    pass: bool,
    #[serde(default)]
    reason: String,
}

impl<C, G> Manager<C, G>
where
    C: Clock + Clone + Send + Sync + 'static,
    G: IdGen + 'static,
{
    /// Entry point wired up in [`super::Manager::run`]. Serializes against
    /// webhook handling for the same session before doing anything else, so
    /// a runner's completion event can never interleave with a concurrent
    /// `stop_signal`/`user_prompt` for the session it belongs to.
    pub(super) async fn dispatch_runner_event(self: Arc<Self>, agent_id: AgentId, event: RunnerEvent) {
        let session_key = {
            let state = self.executor.state();
            let state = state.lock();
            state
                .session_id_for_agent(&agent_id)
                .and_then(|session_id| state.get_session(session_id))
                .map(|session| session.external_session_id.clone())
        };
        let Some(session_key) = session_key else {
            tracing::debug!(agent_id = %agent_id, "runner event for unknown agent, dropping");
            return;
        };

        let _guard = self.keyed.lock(&session_key).await;
        if let Err(err) = self.handle_runner_event(&agent_id, event).await {
            tracing::error!(agent_id = %agent_id, error = %err, "failed to handle runner event");
        }
    }

    async fn handle_runner_event(&self, agent_id: &AgentId, event: RunnerEvent) -> Result<(), RuntimeError> {
        match event {
            RunnerEvent::SessionId(runner_session_id) => self.on_runner_session_id(agent_id, runner_session_id).await,
            RunnerEvent::AssistantDelta(text) => self.on_assistant_delta(agent_id, text).await,
            RunnerEvent::ToolUse { name, input } => self.on_tool_use(agent_id, name, input).await,
            RunnerEvent::Thought(text) => self.on_thought(agent_id, text).await,
            RunnerEvent::Waiting { prompt } => self.on_waiting(agent_id, prompt).await,
            RunnerEvent::Complete { exit_code } => self.on_complete(agent_id, exit_code).await,
            RunnerEvent::Failed(reason) => self.on_failed(agent_id, reason).await,
        }
    }

    /// `(session_id, repository_id, current subroutine)` for the session an
    /// agent belongs to, or `None` if the agent is no longer tracked or its
    /// session already ended — a stop request marks the session `Ended`
    /// synchronously, before the runner's own abort confirmation (`Complete`
    /// with exit 143, or `Failed`) arrives, so that confirmation must be a
    /// no-op rather than re-advancing or re-ending an already-terminal
    /// session: once a session is ended, no further runner spawns for it.
    fn agent_session(&self, agent_id: &AgentId) -> Option<(String, String, String)> {
        let state = self.executor.state();
        let state = state.lock();
        let record = state.agents.get(agent_id)?;
        let session = state.get_session(&record.session_id)?;
        if session.is_terminal() {
            return None;
        }
        Some((session.id.clone(), session.repository_id.clone(), session.subroutine.clone()))
    }

    async fn on_runner_session_id(&self, agent_id: &AgentId, runner_session_id: String) -> Result<(), RuntimeError> {
        let Some((session_id, ..)) = self.agent_session(agent_id) else {
            return Ok(());
        };
        self.apply_effects(vec![
            Effect::Emit {
                event: Event::RunnerSessionStarted {
                    id: RunnerSessionId::new(runner_session_id),
                    session_id: session_id.clone(),
                },
            },
            Effect::Emit {
                event: Event::AgentWorking { agent_id: agent_id.clone() },
            },
            Effect::SetTimer {
                id: TimerId::liveness(&session_id),
                duration: LIVENESS_INTERVAL,
            },
        ])
        .await?;
        Ok(())
    }

    async fn on_assistant_delta(&self, agent_id: &AgentId, text: String) -> Result<(), RuntimeError> {
        let Some((session_id, repository_id, _subroutine)) = self.agent_session(agent_id) else {
            return Ok(());
        };
        self.response_buffers
            .lock()
            .entry(agent_id.clone())
            .or_default()
            .push_str(&text);

        self.apply_effects(vec![Effect::PostActivity {
            session_id,
            repository_id,
            kind: "response".to_string(),
            body: text,
            internal: false,
        }])
        .await?;
        Ok(())
    }

    async fn on_tool_use(&self, agent_id: &AgentId, name: String, input: serde_json::Value) -> Result<(), RuntimeError> {
        let Some((session_id, repository_id, subroutine)) = self.agent_session(agent_id) else {
            return Ok(());
        };
        let spec = ProcedureTable::embedded().spec(&subroutine);

        if !spec.suppress_thought_posting {
            self.apply_effects(vec![Effect::PostActivity {
                session_id: session_id.clone(),
                repository_id,
                kind: "action".to_string(),
                body: format!("Used `{name}`."),
                internal: false,
            }])
            .await?;
        }

        if screenshot_action_taken(&name, &input) {
            let hook = Effect::SendToRunner {
                agent_id: agent_id.clone(),
                input: format!(
                    "The `{name}` tool just produced a file. Upload it via the \
                     `linear_upload_file` tool so it is viewable in the tracker."
                ),
            };
            if let Err(err) = self.apply_effects(vec![hook]).await {
                tracing::warn!(agent_id = %agent_id, error = %err, "screenshot upload hook failed to deliver");
            }
        }
        Ok(())
    }

    async fn on_thought(&self, agent_id: &AgentId, text: String) -> Result<(), RuntimeError> {
        let Some((session_id, repository_id, subroutine)) = self.agent_session(agent_id) else {
            return Ok(());
        };
        let spec = ProcedureTable::embedded().spec(&subroutine);
        if spec.suppress_thought_posting {
            return Ok(());
        }
        self.apply_effects(vec![Effect::PostActivity {
            session_id,
            repository_id,
            kind: "thought".to_string(),
            body: text,
            internal: false,
        }])
        .await?;
        Ok(())
    }

    async fn on_waiting(&self, agent_id: &AgentId, prompt: String) -> Result<(), RuntimeError> {
        let Some((session_id, _repository_id, subroutine)) = self.agent_session(agent_id) else {
            return Ok(());
        };
        let now = self.clock.epoch_ms();
        let decision_id = format!("dec-{}", self.ids.next());
        self.apply_effects(vec![
            Effect::Emit {
                event: Event::DecisionCreated {
                    id: decision_id.clone(),
                    session_id: session_id.clone(),
                    source: "question".to_string(),
                    context: prompt,
                    created_at_ms: now,
                },
            },
            Effect::Emit {
                event: Event::SubroutineWaiting {
                    session_id,
                    subroutine,
                    reason: Some("runner question".to_string()),
                    decision_id: Some(decision_id),
                },
            },
        ])
        .await?;
        Ok(())
    }

    /// The result message for a subroutine is always the last event observed
    /// from its runner, so this is where the procedure engine actually
    /// advances the session. Mirrors the clone-mutate-derive
    /// pattern the rest of the manager uses: [`ProcedureTable::advance`] and
    /// [`ProcedureTable::record_validation`] only know how to mutate a
    /// `&mut Session` in place, but the only sanctioned writer of
    /// [`sylas_storage::MaterializedState`] is `apply_event`, so the engine
    /// mutates a throwaway clone purely to compute what the next durable
    /// event(s) should carry.
    async fn on_complete(&self, agent_id: &AgentId, exit_code: Option<i32>) -> Result<(), RuntimeError> {
        let Some((session_id, repository_id, old_subroutine)) = self.agent_session(agent_id) else {
            return Ok(());
        };
        let final_text = self.response_buffers.lock().remove(agent_id).unwrap_or_default();

        let procedures = ProcedureTable::embedded();
        let spec = procedures.spec(&old_subroutine);
        let now = self.clock.epoch_ms();

        let mut session_clone: Session = {
            let state = self.executor.state();
            let state = state.lock();
            let Some(session) = state.get_session(&session_id) else {
                return Ok(());
            };
            session.clone()
        };
        let runner_name = session_clone.current.runner_name.clone();
        let runner_session_id = session_clone.runner_session_id.clone();

        let (outcome, validation_reason) = if spec.uses_validation_loop {
            let parsed: ValidationOutput = serde_json::from_str(final_text.trim()).unwrap_or_else(|_| ValidationOutput {
                pass: false,
                reason: "validation subroutine did not emit {pass, reason} JSON".to_string(),
            });
            let reason = parsed.reason.clone();
            (
                procedures.record_validation(&mut session_clone, now, parsed.pass, &parsed.reason),
                Some(reason),
            )
        } else {
            (
                procedures.advance(
                    &mut session_clone,
                    now,
                    runner_name.as_deref(),
                    runner_session_id.as_deref(),
                    Some(final_text.as_str()),
                ),
                None,
            )
        };

        let mut effects = vec![Effect::Emit {
            event: Event::AgentExited {
                agent_id: agent_id.clone(),
                exit_code,
            },
        }];

        match outcome {
            Outcome::Advanced => {
                effects.push(Effect::Emit {
                    event: Event::SubroutineCompleted {
                        session_id: session_id.clone(),
                        subroutine: old_subroutine,
                    },
                });
                let repo = self.repository(&RepositoryId::new(repository_id.clone()))?;
                effects.extend(self.build_advance_effects(repo, &session_id, &session_clone));
            }
            Outcome::ValidationFixer => {
                let reason = validation_reason.unwrap_or_default();
                effects.push(Effect::Emit {
                    event: Event::SubroutineFailed {
                        session_id: session_id.clone(),
                        subroutine: old_subroutine,
                        error: reason,
                    },
                });
                let repo = self.repository(&RepositoryId::new(repository_id.clone()))?;
                effects.extend(self.build_advance_effects(repo, &session_id, &session_clone));
            }
            Outcome::AwaitingApproval => {
                let decision_id = format!("dec-{}", self.ids.next());
                effects.push(Effect::Emit {
                    event: Event::DecisionCreated {
                        id: decision_id.clone(),
                        session_id: session_id.clone(),
                        source: "approval".to_string(),
                        context: format!("subroutine `{old_subroutine}` is awaiting approval"),
                        created_at_ms: now,
                    },
                });
                effects.push(Effect::Emit {
                    event: Event::SubroutineWaiting {
                        session_id: session_id.clone(),
                        subroutine: old_subroutine,
                        reason: Some("awaiting approval".to_string()),
                        decision_id: Some(decision_id),
                    },
                });
            }
            Outcome::ProcedureComplete => {
                let summary = if final_text.is_empty() {
                    "Procedure complete.".to_string()
                } else {
                    final_text
                };
                effects.push(Effect::Emit {
                    event: Event::SubroutineCompleted {
                        session_id: session_id.clone(),
                        subroutine: old_subroutine,
                    },
                });
                effects.push(Effect::Emit {
                    event: Event::SessionEnded { id: session_id.clone() },
                });
                effects.push(Effect::CancelTimer {
                    id: TimerId::liveness(&session_id),
                });
                effects.push(Effect::PostActivity {
                    session_id: session_id.clone(),
                    repository_id,
                    kind: "response".to_string(),
                    body: summary,
                    internal: false,
                });
            }
            Outcome::ValidationCapped => {
                let reason = validation_reason.unwrap_or_else(|| "validation loop exceeded its retry cap".to_string());
                effects.push(Effect::Emit {
                    event: Event::SubroutineFailed {
                        session_id: session_id.clone(),
                        subroutine: old_subroutine,
                        error: reason.clone(),
                    },
                });
                effects.push(Effect::Emit {
                    event: Event::SessionEnded { id: session_id.clone() },
                });
                effects.push(Effect::CancelTimer {
                    id: TimerId::liveness(&session_id),
                });
                effects.push(Effect::PostActivity {
                    session_id: session_id.clone(),
                    repository_id,
                    kind: "response".to_string(),
                    body: format!("Validation failed after repeated attempts: {reason}"),
                    internal: false,
                });
            }
            Outcome::CircuitBreaker => {
                let reason = format!("subroutine `{}` was visited too many times", session_clone.subroutine);
                effects.push(Effect::Emit {
                    event: Event::SubroutineFailed {
                        session_id: session_id.clone(),
                        subroutine: old_subroutine,
                        error: reason.clone(),
                    },
                });
                effects.push(Effect::Emit {
                    event: Event::SessionEnded { id: session_id.clone() },
                });
                effects.push(Effect::CancelTimer {
                    id: TimerId::liveness(&session_id),
                });
                effects.push(Effect::PostActivity {
                    session_id: session_id.clone(),
                    repository_id,
                    kind: "response".to_string(),
                    body: reason,
                    internal: false,
                });
            }
        }

        self.apply_effects(effects).await?;
        Ok(())
    }

    /// Build the effects that start the next subroutine's runner, resuming
    /// the prior runner session for that runner kind when one exists.
    /// `session_clone` must already be past [`ProcedureTable::advance`] (its
    /// `subroutine` field is the one to start).
    fn build_advance_effects(&self, repo: &Repository, session_id: &str, session_clone: &Session) -> Vec<Effect> {
        let procedures = ProcedureTable::embedded();
        let next_subroutine = session_clone.subroutine.clone();
        let spec = procedures.spec(&next_subroutine);

        let Some(workspace_path) = session_clone.workspace_path.clone() else {
            return vec![Effect::Emit {
                event: Event::SubroutineFailed {
                    session_id: session_id.to_string(),
                    subroutine: next_subroutine,
                    error: "session has no workspace to continue into".to_string(),
                },
            }];
        };

        let runner_name = session_clone
            .history
            .iter()
            .rev()
            .find_map(|r| r.runner_name.clone())
            .unwrap_or_else(|| select_runner_kind(repo, &[], "", &self.runners));
        let resume_runner_session_id = session_clone
            .runner_session_id_for(&runner_name)
            .map(|id| RunnerSessionId::new(id.to_string()));

        let new_agent_id = AgentId::new(format!("agent-{}", self.ids.next()));
        vec![
            Effect::Emit {
                event: Event::SessionAdvanced {
                    id: session_id.to_string(),
                    subroutine: next_subroutine.clone(),
                },
            },
            Effect::Emit {
                event: Event::SubroutineStarted {
                    session_id: session_id.to_string(),
                    subroutine: next_subroutine,
                    agent_id: Some(new_agent_id.clone()),
                    runner_name: Some(runner_name.clone()),
                },
            },
            Effect::SpawnRunner {
                agent_id: new_agent_id,
                runner_name,
                session_id: session_id.to_string(),
                workspace_path,
                input: "Continue to the next step of the procedure.".to_string(),
                env: repo.env.clone().into_iter().collect(),
                cwd: None,
                streaming: !spec.single_turn,
                resume_runner_session_id,
                runner_config: build_runner_config(repo, &spec),
            },
            Effect::SetTimer {
                id: TimerId::liveness(session_id),
                duration: LIVENESS_INTERVAL,
            },
        ]
    }

    async fn on_failed(&self, agent_id: &AgentId, reason: String) -> Result<(), RuntimeError> {
        let Some((session_id, repository_id, subroutine)) = self.agent_session(agent_id) else {
            return Ok(());
        };
        self.response_buffers.lock().remove(agent_id);

        let error = classify_agent_error(&reason);
        let effects = vec![
            Effect::Emit {
                event: Event::AgentFailed {
                    agent_id: agent_id.clone(),
                    error: error.clone(),
                },
            },
            Effect::Emit {
                event: Event::SubroutineFailed {
                    session_id: session_id.clone(),
                    subroutine,
                    error: error.to_string(),
                },
            },
            Effect::Emit {
                event: Event::SessionEnded { id: session_id.clone() },
            },
            Effect::CancelTimer {
                id: TimerId::liveness(&session_id),
            },
            Effect::PostActivity {
                session_id,
                repository_id,
                kind: "response".to_string(),
                body: format!("Error: {error}"),
                internal: false,
            },
        ];
        self.apply_effects(effects).await?;
        Ok(())
    }
}

/// Whether a tool invocation is one of the screenshot/recording tools in a
/// state that actually produced a file: the two multi-action MCP tools only
/// count on their file-producing action.
fn screenshot_action_taken(name: &str, input: &serde_json::Value) -> bool {
    if !SCREENSHOT_TOOLS.contains(&name) {
        return false;
    }
    match name {
        "mcp__claude-in-chrome__computer" => input.get("action").and_then(|v| v.as_str()) == Some("screenshot"),
        "mcp__claude-in-chrome__gif_creator" => input.get("action").and_then(|v| v.as_str()) == Some("export"),
        _ => true,
    }
}

/// Map a runner's raw failure text to the error taxonomy used to decide
/// retry/fallback policy elsewhere in the system.
fn classify_agent_error(reason: &str) -> AgentError {
    let lower = reason.to_lowercase();
    if lower.contains("unauthorized") || lower.contains("401") || lower.contains("invalid api key") {
        AgentError::Unauthorized
    } else if lower.contains("credit") || lower.contains("quota") || lower.contains("billing") {
        AgentError::OutOfCredits
    } else if lower.contains("rate limit") || lower.contains("429") {
        AgentError::RateLimited
    } else if lower.contains("network") || lower.contains("dns") || lower.contains("connection") {
        AgentError::NoInternet
    } else {
        AgentError::Other(reason.to_string())
    }
}
