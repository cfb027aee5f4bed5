// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The materialized state: every `Event` folded into the current picture
//! of sessions, workspaces, decisions, and runner bookkeeping.
//!
//! This struct is rebuilt from scratch by replaying the WAL (or by loading
//! a snapshot and replaying the suffix since it was taken). `apply_event`
//! is the single place that may mutate it — nothing else in this crate, or
//! any crate above it, reaches into these maps directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use sylas_core::{
    AgentError, AgentId, Decision, DecisionId, DecisionOption, DecisionSource, Event, RunnerSessionId,
    Session, SessionConfig, SessionStatus, SubroutineOutcome, SubroutineStatus, TimerId, WorkspaceId,
    WorkspaceStatus,
};

/// A managed directory (plain checkout or git worktree) backing one or more
/// sessions. Distinct from [`sylas_core::WorkspaceStatus`], which only
/// tracks the lifecycle tag; this is the storage-layer record carrying the
/// path and owning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub path: PathBuf,
    pub owner_session_id: Option<String>,
    pub status: WorkspaceStatus,
}

impl Workspace {
    fn creating(id: WorkspaceId, path: PathBuf, owner_session_id: Option<String>) -> Self {
        Self {
            id,
            path,
            owner_session_id,
            status: WorkspaceStatus::Creating,
        }
    }
}

/// Runtime status of a single runner invocation, as last observed from the
/// agent monitor. Distinct from [`sylas_core::SubroutineStatus`], which
/// tracks the session's own state machine rather than the OS process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRuntimeStatus {
    Spawning,
    Working,
    WaitingForInput,
    Failed(String),
    Exited(Option<i32>),
    Gone,
}

/// One tracked agent invocation: which session it belongs to and its last
/// observed runtime status. Kept separately from `Session::history` so the
/// manager can route `agent:*` events (which carry only an `AgentId`) back
/// to a session without a linear scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub session_id: String,
    pub subroutine: String,
    pub status: AgentRuntimeStatus,
}

/// The full folded state of the system at some WAL sequence number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedState {
    /// Sessions keyed by their own (Sylas-internal) id.
    pub sessions: HashMap<String, Session>,
    /// `external_session_id -> session id`, so inbound webhooks resolve in
    /// O(1) instead of scanning `sessions`.
    pub external_index: HashMap<String, String>,
    pub workspaces: HashMap<WorkspaceId, Workspace>,
    pub decisions: HashMap<String, Decision>,
    pub agents: HashMap<AgentId, AgentRecord>,
    pub runner_sessions: HashMap<RunnerSessionId, String>,
    /// Last known credential expiry per repository, recorded so a cold
    /// start can tell a stale credential apart from one that simply hasn't
    /// been refreshed yet. The access/refresh token values themselves are
    /// never written to the WAL.
    pub token_expiry: HashMap<String, u64>,
    pub active_timers: HashMap<TimerId, ()>,
    pub shutting_down: bool,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn session_for_external_id(&self, external_session_id: &str) -> Option<&Session> {
        self.external_index
            .get(external_session_id)
            .and_then(|id| self.sessions.get(id))
    }

    pub fn get_decision(&self, id: &str) -> Option<&Decision> {
        self.decisions.get(id)
    }

    pub fn get_workspace(&self, id: &WorkspaceId) -> Option<&Workspace> {
        self.workspaces.get(id)
    }

    pub fn session_id_for_agent(&self, agent_id: &AgentId) -> Option<&str> {
        self.agents.get(agent_id).map(|r| r.session_id.as_str())
    }

    /// Active (non-terminal) sessions, for the `/status` busy gauge and the
    /// operator CLI's `status` command.
    pub fn active_session_count(&self) -> usize {
        self.sessions.values().filter(|s| !s.is_terminal()).count()
    }

    /// Fold one event into the state. Must be deterministic and infallible:
    /// a malformed event here means the WAL itself is corrupt, which is a
    /// process-startup failure, not a runtime one.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::TrackerMessageReceived { .. } => {
                // Pure ingress fact; the lifecycle manager reacts to it by
                // emitting SessionCreated/SessionAdvanced/etc. Nothing to
                // fold here beyond the historical record already in the WAL.
            }

            Event::SessionCreated {
                id,
                external_session_id,
                repository_id,
                procedure_kind,
                procedure_hash,
                cwd,
                vars,
                initial_subroutine,
                labels,
                created_at_epoch_ms,
            } => {
                let session = Session::new(
                    SessionConfig {
                        id: id.clone(),
                        external_session_id: external_session_id.clone(),
                        repository_id: repository_id.clone(),
                        procedure_kind: procedure_kind.clone(),
                        vars: vars.clone(),
                        procedure_hash: procedure_hash.clone(),
                        cwd: cwd.clone(),
                        initial_subroutine: initial_subroutine.clone(),
                        labels: labels.clone(),
                    },
                    *created_at_epoch_ms,
                );
                self.external_index
                    .insert(external_session_id.clone(), id.clone());
                self.sessions.insert(id.clone(), session);
            }

            Event::SessionAdvanced { id, subroutine } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.subroutine = subroutine.clone();
                    session.subroutine_status = SubroutineStatus::Pending;
                    session.status = SessionStatus::Active;
                    session.record_subroutine_visit(subroutine);
                }
            }

            Event::SessionUpdated { id, vars } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.vars.extend(vars.clone());
                }
            }

            Event::SessionResumed {
                id,
                message,
                vars,
                kill,
            } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.vars.extend(vars.clone());
                    session.error = None;
                    session.cancelling = false;
                    session.subroutine_status = SubroutineStatus::Pending;
                    session.status = SessionStatus::Active;
                    if *kill {
                        session.runner_session_id = None;
                    }
                    if let Some(message) = message {
                        session.vars.insert("resume_message".to_string(), message.clone());
                    }
                }
            }

            Event::SessionProcedureReset {
                id,
                procedure_kind,
                procedure_hash,
                subroutine,
                reset_at_epoch_ms,
            } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.finalize_current_subroutine(
                        SubroutineOutcome::Failed("procedure reset by new prompt".to_string()),
                        *reset_at_epoch_ms,
                    );
                    session.procedure_kind = procedure_kind.clone();
                    session.procedure_hash = procedure_hash.clone();
                    session.subroutine = subroutine.clone();
                    session.subroutine_status = SubroutineStatus::Pending;
                    session.status = SessionStatus::Active;
                    session.reset_validation_iteration();
                    session.push_subroutine(subroutine, *reset_at_epoch_ms);
                    session.record_subroutine_visit(subroutine);
                }
            }

            Event::SessionStopping { id } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.cancelling = true;
                    session.status = SessionStatus::Completing;
                }
            }

            Event::SessionStop { id } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.subroutine_status = SubroutineStatus::Completed;
                    session.cancelling = false;
                    session.status = SessionStatus::Ended;
                }
            }

            Event::SessionEnded { id } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.finalize_current_subroutine(SubroutineOutcome::Completed, 0);
                    session.status = SessionStatus::Ended;
                }
            }

            Event::RunnerSessionStarted { id, session_id } => {
                self.runner_sessions.insert(id.clone(), session_id.clone());
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.runner_session_id = Some(id.to_string());
                }
            }

            Event::RunnerSessionInput { .. } => {
                // Transcript-only fact; no materialized state to fold.
            }

            Event::RunnerSessionEnded { id } => {
                self.runner_sessions.remove(id);
            }

            Event::SubroutineStarted {
                session_id,
                subroutine,
                agent_id,
                runner_name,
            } => {
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.subroutine = subroutine.clone();
                    session.subroutine_status = SubroutineStatus::Running;
                    session.status = SessionStatus::Active;
                    if let Some(agent_id) = agent_id {
                        session.set_current_subroutine_agent_id(agent_id.as_str());
                        self.agents.insert(
                            agent_id.clone(),
                            AgentRecord {
                                agent_id: agent_id.clone(),
                                session_id: session_id.clone(),
                                subroutine: subroutine.clone(),
                                status: AgentRuntimeStatus::Spawning,
                            },
                        );
                    }
                    if let Some(runner_name) = runner_name {
                        session.set_current_subroutine_runner_name(runner_name);
                    }
                }
            }

            Event::SubroutineWaiting {
                session_id,
                reason,
                decision_id,
                ..
            } => {
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.subroutine_status = SubroutineStatus::Waiting(decision_id.clone());
                    session.update_current_subroutine_outcome(SubroutineOutcome::Waiting(
                        decision_id.clone().unwrap_or_default(),
                    ));
                    session.status = if reason.as_deref() == Some("awaiting approval") {
                        SessionStatus::AwaitingApproval
                    } else {
                        SessionStatus::AwaitingInput
                    };
                }
            }

            Event::SubroutineCompleted {
                session_id,
                subroutine,
            } => {
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.subroutine_status = SubroutineStatus::Completed;
                    session.update_current_subroutine_outcome(SubroutineOutcome::Completed);
                    let _ = subroutine;
                }
            }

            Event::SubroutineFailed {
                session_id, error, ..
            } => {
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.subroutine_status = SubroutineStatus::Failed;
                    session.error = Some(error.clone());
                    session.update_current_subroutine_outcome(SubroutineOutcome::Failed(error.clone()));
                }
            }

            Event::ActivityPosted { .. } => {
                // Historical fact only; nothing to project into current state.
            }

            Event::TokenRefreshed {
                repository_id,
                expires_at_epoch_ms,
            } => {
                self.token_expiry
                    .insert(repository_id.clone(), *expires_at_epoch_ms);
            }

            Event::DecisionCreated {
                id,
                session_id,
                source,
                context,
                created_at_ms,
            } => {
                let source = parse_decision_source(source);
                self.decisions.insert(
                    id.clone(),
                    Decision {
                        id: DecisionId::new(id.clone()),
                        session_id: session_id.clone(),
                        agent_id: self
                            .sessions
                            .get(session_id)
                            .and_then(|s| s.current.agent_id.clone()),
                        source,
                        context: context.clone(),
                        options: Vec::<DecisionOption>::new(),
                        chosen: None,
                        message: None,
                        created_at_ms: *created_at_ms,
                        resolved_at_ms: None,
                        repository_id: self
                            .sessions
                            .get(session_id)
                            .map(|s| s.repository_id.clone())
                            .unwrap_or_default(),
                    },
                );
            }

            Event::DecisionResolved {
                id,
                chosen,
                message,
                resolved_at_ms,
            } => {
                if let Some(decision) = self.decisions.get_mut(id) {
                    decision.chosen = *chosen;
                    decision.message = message.clone();
                    decision.resolved_at_ms = Some(*resolved_at_ms);
                }
            }

            Event::Shutdown => {
                self.shutting_down = true;
            }

            Event::TimerStart { id } => {
                self.active_timers.insert(id.clone(), ());
            }

            Event::WorkspaceCreated {
                id,
                path,
                branch: _,
                owner_session_id,
                workspace_type: _,
            } => {
                self.workspaces.insert(
                    id.clone(),
                    Workspace::creating(id.clone(), path.clone(), owner_session_id.clone()),
                );
            }

            Event::WorkspaceReady { id } => {
                if let Some(ws) = self.workspaces.get_mut(id) {
                    ws.status = WorkspaceStatus::Ready;
                }
            }

            Event::WorkspaceFailed { id, reason } => {
                if let Some(ws) = self.workspaces.get_mut(id) {
                    ws.status = WorkspaceStatus::Failed {
                        reason: reason.clone(),
                    };
                }
            }

            Event::WorkspaceDeleted { id } => {
                self.workspaces.remove(id);
            }

            // -- agent runtime status --
            Event::AgentWorking { agent_id } => self.set_agent_status(agent_id, AgentRuntimeStatus::Working),
            Event::AgentWaiting { agent_id } => {
                self.set_agent_status(agent_id, AgentRuntimeStatus::WaitingForInput)
            }
            Event::AgentFailed { agent_id, error } => {
                self.set_agent_status(agent_id, AgentRuntimeStatus::Failed(agent_error_text(error)))
            }
            Event::AgentExited { agent_id, exit_code } => {
                self.set_agent_status(agent_id, AgentRuntimeStatus::Exited(*exit_code))
            }
            Event::AgentGone { agent_id } => self.set_agent_status(agent_id, AgentRuntimeStatus::Gone),
            Event::AgentInput { .. }
            | Event::AgentSignal { .. }
            | Event::AgentIdle { .. }
            | Event::AgentStop { .. }
            | Event::AgentPrompt { .. } => {
                // Transcript/signal facts; the procedure engine reacts to
                // these directly rather than folding them into state.
            }
        }
    }

    fn set_agent_status(&mut self, agent_id: &AgentId, status: AgentRuntimeStatus) {
        if let Some(record) = self.agents.get_mut(agent_id) {
            record.status = status;
        }
    }
}

fn agent_error_text(error: &AgentError) -> String {
    error.to_string()
}

fn parse_decision_source(raw: &str) -> DecisionSource {
    match raw {
        "question" => DecisionSource::Question,
        "approval" => DecisionSource::Approval,
        "gate" => DecisionSource::Gate,
        "error" => DecisionSource::Error,
        "idle" => DecisionSource::Idle,
        _ => DecisionSource::ValidationCapped,
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
