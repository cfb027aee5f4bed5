// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor: turns an [`Effect`] into the adapter/tracker call (or
//! filesystem/timer action) it describes, and folds the resulting event
//! into the shared [`MaterializedState`] immediately so later effects in
//! the same batch observe it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sylas_core::{Clock, Effect, Event, RepositoryId};
use sylas_runners::{RunnerAdapter, RunnerError, RunnerSpawnConfig};
use sylas_storage::MaterializedState;
use sylas_tracker::service::{ActivityKind, CreateActivity};
use sylas_tracker::{TrackerError, TrackerService};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::scheduler::Scheduler;
use crate::workspace::{WorkspaceError, WorkspaceFactory};

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("runner adapter not configured for kind: {0}")]
    RunnerKindNotFound(String),
    #[error("tracker service not configured for repository: {0}")]
    RepositoryNotFound(String),
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),
}

/// Everything the executor needs to carry out an [`Effect`]: the runner
/// adapters keyed by runner name, the tracker services keyed by repository,
/// and a workspace factory for the `CreateWorkspace`/`DeleteWorkspace` pair.
pub struct Executor<C: Clock> {
    runners: HashMap<String, Arc<dyn RunnerAdapter>>,
    trackers: HashMap<RepositoryId, Arc<dyn TrackerService>>,
    workspaces: Arc<dyn WorkspaceFactory>,
    state: Arc<Mutex<MaterializedState>>,
    scheduler: Arc<Mutex<Scheduler>>,
    clock: C,
    /// Runner events (assistant deltas, completion, failure) flow back in
    /// through this channel from the per-agent watcher tasks spawned by
    /// `SpawnRunner`, for the activity relay and the manager's own event loop.
    runner_event_tx: mpsc::UnboundedSender<(sylas_core::AgentId, sylas_runners::RunnerEvent)>,
}

impl<C: Clock + Clone + Send + Sync + 'static> Executor<C> {
    pub fn new(
        runners: HashMap<String, Arc<dyn RunnerAdapter>>,
        trackers: HashMap<RepositoryId, Arc<dyn TrackerService>>,
        workspaces: Arc<dyn WorkspaceFactory>,
        state: Arc<Mutex<MaterializedState>>,
        scheduler: Arc<Mutex<Scheduler>>,
        clock: C,
        runner_event_tx: mpsc::UnboundedSender<(sylas_core::AgentId, sylas_runners::RunnerEvent)>,
    ) -> Self {
        Self {
            runners,
            trackers,
            workspaces,
            state,
            scheduler,
            clock,
            runner_event_tx,
        }
    }

    fn runner(&self, name: &str) -> Result<&Arc<dyn RunnerAdapter>, ExecuteError> {
        self.runners
            .get(name)
            .ok_or_else(|| ExecuteError::RunnerKindNotFound(name.to_string()))
    }

    fn tracker(&self, repository_id: &str) -> Result<&Arc<dyn TrackerService>, ExecuteError> {
        self.trackers
            .get(&RepositoryId::new(repository_id))
            .ok_or_else(|| ExecuteError::RepositoryNotFound(repository_id.to_string()))
    }

    /// Execute one effect, tracing its span like the rest of the engine
    /// does. Returns the event produced (if any) so the caller can append
    /// it to the WAL and fold it into state.
    pub async fn execute(&self, effect: Effect) -> Result<Option<Event>, ExecuteError> {
        let op_name = effect.name();
        let span = tracing::info_span!("effect", effect = op_name);
        let _guard = span.enter();
        tracing::info!(fields = ?effect.fields(), "executing");

        let start = std::time::Instant::now();
        let result = self.execute_inner(effect).await;
        let elapsed = start.elapsed();
        match &result {
            Ok(event) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                has_event = event.is_some(),
                "completed"
            ),
            Err(e) => tracing::error!(elapsed_ms = elapsed.as_millis() as u64, error = %e, "failed"),
        }
        result
    }

    pub async fn execute_all(&self, effects: Vec<Effect>) -> Result<Vec<Event>, ExecuteError> {
        let mut events = Vec::new();
        for effect in effects {
            if let Some(event) = self.execute(effect).await? {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn execute_inner(&self, effect: Effect) -> Result<Option<Event>, ExecuteError> {
        match effect {
            Effect::Emit { event } => {
                self.state.lock().apply_event(&event);
                Ok(Some(event))
            }

            Effect::SpawnRunner {
                agent_id,
                runner_name,
                session_id,
                workspace_path,
                input,
                env,
                cwd: _,
                streaming,
                resume_runner_session_id,
                runner_config,
            } => {
                let runner = self.runner(&runner_name)?.clone();
                let config = RunnerSpawnConfig {
                    agent_id: agent_id.clone(),
                    workspace_path,
                    resume_session_id: resume_runner_session_id.map(|id| id.to_string()),
                    prompt: input,
                    env,
                    allowed_tools: runner_config
                        .get("allowed_tools")
                        .and_then(|v| serde_json::from_value(v.clone()).ok()),
                    disallowed_tools: runner_config
                        .get("disallowed_tools")
                        .and_then(|v| serde_json::from_value(v.clone()).ok()),
                    mcp_configs: runner_config
                        .get("mcp_configs")
                        .and_then(|v| v.as_array().cloned())
                        .unwrap_or_default(),
                };

                let mut rx = if streaming {
                    runner.start_streaming(config).await?
                } else {
                    runner.start(config).await?
                };
                let event_tx = self.runner_event_tx.clone();
                let forwarded_agent_id = agent_id.clone();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        if event_tx.send((forwarded_agent_id.clone(), event)).is_err() {
                            break;
                        }
                    }
                });

                // The caller pairs this effect with `Effect::Emit {
                // Event::SubroutineStarted }` in the same batch; that event
                // (not this one) is what registers the agent_id -> session_id
                // route in `MaterializedState::agents`.
                let _ = session_id;
                Ok(None)
            }

            Effect::SendToRunner { agent_id, input } => {
                let runner_name = {
                    let state = self.state.lock();
                    state
                        .agents
                        .get(&agent_id)
                        .and_then(|r| state.sessions.get(&r.session_id))
                        .and_then(|s| s.current.runner_name.clone())
                };
                let Some(runner_name) = runner_name else {
                    return Err(ExecuteError::RunnerKindNotFound(agent_id.to_string()));
                };
                self.runner(&runner_name)?.add_stream_message(&agent_id, &input).await?;
                Ok(None)
            }

            Effect::StopRunner { agent_id } => {
                let runner_name = {
                    let state = self.state.lock();
                    state
                        .agents
                        .get(&agent_id)
                        .and_then(|r| state.sessions.get(&r.session_id))
                        .and_then(|s| s.current.runner_name.clone())
                };
                if let Some(runner_name) = runner_name {
                    self.runner(&runner_name)?.stop(&agent_id).await?;
                }
                Ok(None)
            }

            Effect::CreateWorkspace {
                workspace_id,
                path,
                owner,
                workspace_type,
                repo_root,
                branch,
                start_point,
            } => {
                let create_event = Event::WorkspaceCreated {
                    id: workspace_id.clone(),
                    path: path.clone(),
                    branch: branch.clone(),
                    owner_session_id: owner,
                    workspace_type,
                };
                self.state.lock().apply_event(&create_event);

                self.workspaces
                    .create(&path, repo_root.as_deref(), branch.as_deref(), start_point.as_deref())
                    .await?;

                let ready_event = Event::WorkspaceReady { id: workspace_id };
                self.state.lock().apply_event(&ready_event);
                Ok(Some(ready_event))
            }

            Effect::DeleteWorkspace { workspace_id } => {
                let path = {
                    let state = self.state.lock();
                    state
                        .workspaces
                        .get(&workspace_id)
                        .map(|w| w.path.clone())
                        .ok_or_else(|| ExecuteError::WorkspaceNotFound(workspace_id.to_string()))?
                };
                self.workspaces.delete(&path).await?;
                let event = Event::WorkspaceDeleted { id: workspace_id };
                self.state.lock().apply_event(&event);
                Ok(Some(event))
            }

            Effect::SetTimer { id, duration } => {
                let now = self.clock.epoch_ms();
                self.scheduler.lock().set_timer(id, duration.as_millis() as u64, now);
                Ok(None)
            }

            Effect::CancelTimer { id } => {
                self.scheduler.lock().cancel_timer(&id);
                Ok(None)
            }

            Effect::PostActivity {
                session_id,
                repository_id,
                kind,
                body,
                internal: _,
            } => {
                let external_session_id = {
                    let state = self.state.lock();
                    state
                        .get_session(&session_id)
                        .map(|s| s.external_session_id.clone())
                        .ok_or_else(|| ExecuteError::RepositoryNotFound(session_id.clone()))?
                };
                self.tracker(&repository_id)?
                    .create_agent_activity(CreateActivity {
                        external_session_id: &external_session_id,
                        kind: activity_kind_from_str(&kind),
                        body: &body,
                    })
                    .await?;
                let event = Event::ActivityPosted {
                    session_id,
                    repository_id,
                    body_hash: body_hash(&body),
                };
                self.state.lock().apply_event(&event);
                Ok(Some(event))
            }

            Effect::UploadAttachment { .. } => {
                // The relay performs the upload inline (it owns the bytes);
                // this effect variant exists for the WAL record only.
                Ok(None)
            }

            Effect::RefreshToken { repository_id } => {
                // Token refresh is coordinated by `sylas_tracker::RefreshCoordinator`,
                // which the manager invokes directly on a 401; this effect
                // records the fact for the WAL once the refresh completes.
                let _ = repository_id;
                Ok(None)
            }

            Effect::WriteSnapshot => {
                // The manager's checkpoint loop owns snapshot cadence; this
                // effect is a request to checkpoint sooner than that cadence.
                Ok(None)
            }
        }
    }

    pub fn state(&self) -> Arc<Mutex<MaterializedState>> {
        Arc::clone(&self.state)
    }

    pub fn scheduler(&self) -> Arc<Mutex<Scheduler>> {
        Arc::clone(&self.scheduler)
    }
}

fn activity_kind_from_str(kind: &str) -> ActivityKind {
    match kind {
        "action" => ActivityKind::Action,
        "thought" => ActivityKind::Thought,
        "procedure-selection" => ActivityKind::ProcedureSelection,
        "analyzing" => ActivityKind::Analyzing,
        _ => ActivityKind::Response,
    }
}

/// Content hash recorded on `Event::ActivityPosted` so a replayed WAL can
/// tell which activities were posted without keeping the body text itself
/// (the tracker is the system of record for activity bodies).
fn body_hash(body: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(body.as_bytes()))
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
