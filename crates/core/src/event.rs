// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types: the single source of truth for the Sylas engine.
//!
//! Every state-mutating fact is represented as an `Event` and appended to
//! the write-ahead log before anything else observes it. The materialized
//! state in `sylas-storage` is rebuilt by folding this log from scratch.

use crate::agent::{AgentError, AgentId, AgentState};
use crate::id::ShortId;
use crate::runner_session::RunnerSessionId;
use crate::timer::TimerId;
use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Kind of signal a runner can emit to drive procedure advancement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSignalKind {
    /// Advance the session to the next subroutine.
    Complete,
    /// Pause the session and raise a decision for human intervention.
    Escalate,
    /// No-op acknowledgement — runner is still working.
    Continue,
}

/// Type of prompt a runner is showing (from a hook/hint, not a guess).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    Permission,
    Idle,
    PlanApproval,
    Question,
    Other,
}

/// Structured data from an interactive question the runner raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionData {
    pub questions: Vec<QuestionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEntry {
    pub question: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default, rename = "multiSelect")]
    pub multi_select: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_prompt_type() -> PromptType {
    PromptType::Other
}

fn is_empty_map<K, V>(map: &HashMap<K, V>) -> bool {
    map.is_empty()
}

/// Events that trigger state transitions in the system.
///
/// Serializes with `{"type": "event:name", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- agent (runner) --
    #[serde(rename = "agent:working")]
    AgentWorking { agent_id: AgentId },

    #[serde(rename = "agent:waiting")]
    AgentWaiting { agent_id: AgentId },

    #[serde(rename = "agent:failed")]
    AgentFailed { agent_id: AgentId, error: AgentError },

    #[serde(rename = "agent:exited")]
    AgentExited {
        agent_id: AgentId,
        exit_code: Option<i32>,
    },

    #[serde(rename = "agent:gone")]
    AgentGone { agent_id: AgentId },

    /// User- or system-initiated input sent to a running agent.
    #[serde(rename = "agent:input")]
    AgentInput { agent_id: AgentId, input: String },

    /// Completion/escalation signal parsed from the runner's own output.
    #[serde(rename = "agent:signal")]
    AgentSignal {
        agent_id: AgentId,
        kind: AgentSignalKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Agent is idle (from a runner hook).
    #[serde(rename = "agent:idle")]
    AgentIdle { agent_id: AgentId },

    /// Agent's stop hook fired with on_stop=escalate configured.
    #[serde(rename = "agent:stop")]
    AgentStop { agent_id: AgentId },

    /// Agent is showing an interactive prompt.
    #[serde(rename = "agent:prompt")]
    AgentPrompt {
        agent_id: AgentId,
        #[serde(default = "default_prompt_type")]
        prompt_type: PromptType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question_data: Option<QuestionData>,
    },

    // -- tracker ingress --
    /// A webhook was accepted and translated into a normalized message.
    #[serde(rename = "tracker:message_received")]
    TrackerMessageReceived {
        repository_id: String,
        external_session_id: String,
        /// Normalized message kind: "session_start", "user_prompt",
        /// "stop_signal", "unassign", or "content_update".
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default)]
        raw_webhook_id: String,
    },

    // -- session --
    #[serde(rename = "session:created")]
    SessionCreated {
        id: String,
        external_session_id: String,
        repository_id: String,
        procedure_kind: String,
        procedure_hash: String,
        cwd: PathBuf,
        vars: HashMap<String, String>,
        initial_subroutine: String,
        #[serde(default)]
        labels: Vec<String>,
        #[serde(default)]
        created_at_epoch_ms: u64,
    },

    #[serde(rename = "session:advanced")]
    SessionAdvanced { id: String, subroutine: String },

    #[serde(rename = "session:updated")]
    SessionUpdated {
        id: String,
        vars: HashMap<String, String>,
    },

    #[serde(rename = "session:resumed")]
    SessionResumed {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "is_empty_map")]
        vars: HashMap<String, String>,
        /// Kill the existing runner session and start fresh.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        kill: bool,
    },

    /// A fresh user prompt arrived on an already-running session; the
    /// classifier re-ran and the session restarts at a (possibly new)
    /// procedure's first subroutine without tearing down the runner.
    #[serde(rename = "session:procedure_reset")]
    SessionProcedureReset {
        id: String,
        procedure_kind: String,
        procedure_hash: String,
        subroutine: String,
        #[serde(default)]
        reset_at_epoch_ms: u64,
    },

    #[serde(rename = "session:stopping")]
    SessionStopping { id: String },

    #[serde(rename = "session:stop")]
    SessionStop { id: String },

    #[serde(rename = "session:ended")]
    SessionEnded { id: String },

    // -- runner session (CLI process's own conversation) --
    #[serde(rename = "runner_session:started")]
    RunnerSessionStarted {
        id: RunnerSessionId,
        session_id: String,
    },

    #[serde(rename = "runner_session:input")]
    RunnerSessionInput { id: RunnerSessionId, input: String },

    #[serde(rename = "runner_session:ended")]
    RunnerSessionEnded { id: RunnerSessionId },

    // -- subroutine --
    /// Subroutine has started running.
    #[serde(rename = "subroutine:started")]
    SubroutineStarted {
        session_id: String,
        subroutine: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runner_name: Option<String>,
    },

    /// Subroutine is waiting for human intervention.
    #[serde(rename = "subroutine:waiting")]
    SubroutineWaiting {
        session_id: String,
        subroutine: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        decision_id: Option<String>,
    },

    /// Subroutine completed successfully.
    #[serde(rename = "subroutine:completed")]
    SubroutineCompleted { session_id: String, subroutine: String },

    /// Subroutine failed.
    #[serde(rename = "subroutine:failed")]
    SubroutineFailed {
        session_id: String,
        subroutine: String,
        error: String,
    },

    // -- activity relay --
    #[serde(rename = "activity:posted")]
    ActivityPosted {
        session_id: String,
        repository_id: String,
        body_hash: String,
    },

    // -- oauth / credentials --
    #[serde(rename = "token:refreshed")]
    TokenRefreshed {
        repository_id: String,
        expires_at_epoch_ms: u64,
    },

    // -- decision --
    #[serde(rename = "decision:created")]
    DecisionCreated {
        id: String,
        session_id: String,
        source: String,
        context: String,
        #[serde(default)]
        created_at_ms: u64,
    },

    #[serde(rename = "decision:resolved")]
    DecisionResolved {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chosen: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default)]
        resolved_at_ms: u64,
    },

    // -- system --
    #[serde(rename = "system:shutdown")]
    Shutdown,

    // -- timer --
    #[serde(rename = "timer:start")]
    TimerStart { id: TimerId },

    // -- workspace --
    #[serde(rename = "workspace:created")]
    WorkspaceCreated {
        id: WorkspaceId,
        path: PathBuf,
        branch: Option<String>,
        #[serde(default)]
        owner_session_id: Option<String>,
        #[serde(default)]
        workspace_type: Option<String>,
    },

    #[serde(rename = "workspace:ready")]
    WorkspaceReady { id: WorkspaceId },

    #[serde(rename = "workspace:failed")]
    WorkspaceFailed { id: WorkspaceId, reason: String },

    #[serde(rename = "workspace:deleted")]
    WorkspaceDeleted { id: WorkspaceId },
}

impl Event {
    /// Create an agent event from an `AgentState` (detected via monitoring).
    pub fn from_agent_state(agent_id: AgentId, state: AgentState) -> Self {
        match state {
            AgentState::Working => Event::AgentWorking { agent_id },
            AgentState::WaitingForInput => Event::AgentWaiting { agent_id },
            AgentState::Failed(error) => Event::AgentFailed { agent_id, error },
            AgentState::Exited { exit_code } => Event::AgentExited { agent_id, exit_code },
            AgentState::SessionGone => Event::AgentGone { agent_id },
        }
    }

    /// Stable event name for log spans and metrics (e.g. "subroutine:completed").
    pub fn name(&self) -> &'static str {
        match self {
            Event::AgentWorking { .. } => "agent:working",
            Event::AgentWaiting { .. } => "agent:waiting",
            Event::AgentFailed { .. } => "agent:failed",
            Event::AgentExited { .. } => "agent:exited",
            Event::AgentGone { .. } => "agent:gone",
            Event::AgentInput { .. } => "agent:input",
            Event::AgentSignal { .. } => "agent:signal",
            Event::AgentIdle { .. } => "agent:idle",
            Event::AgentStop { .. } => "agent:stop",
            Event::AgentPrompt { .. } => "agent:prompt",
            Event::TrackerMessageReceived { .. } => "tracker:message_received",
            Event::SessionCreated { .. } => "session:created",
            Event::SessionAdvanced { .. } => "session:advanced",
            Event::SessionUpdated { .. } => "session:updated",
            Event::SessionResumed { .. } => "session:resumed",
            Event::SessionProcedureReset { .. } => "session:procedure_reset",
            Event::SessionStopping { .. } => "session:stopping",
            Event::SessionStop { .. } => "session:stop",
            Event::SessionEnded { .. } => "session:ended",
            Event::RunnerSessionStarted { .. } => "runner_session:started",
            Event::RunnerSessionInput { .. } => "runner_session:input",
            Event::RunnerSessionEnded { .. } => "runner_session:ended",
            Event::SubroutineStarted { .. } => "subroutine:started",
            Event::SubroutineWaiting { .. } => "subroutine:waiting",
            Event::SubroutineCompleted { .. } => "subroutine:completed",
            Event::SubroutineFailed { .. } => "subroutine:failed",
            Event::ActivityPosted { .. } => "activity:posted",
            Event::TokenRefreshed { .. } => "token:refreshed",
            Event::DecisionCreated { .. } => "decision:created",
            Event::DecisionResolved { .. } => "decision:resolved",
            Event::Shutdown => "system:shutdown",
            Event::TimerStart { .. } => "timer:start",
            Event::WorkspaceCreated { .. } => "workspace:created",
            Event::WorkspaceReady { .. } => "workspace:ready",
            Event::WorkspaceFailed { .. } => "workspace:failed",
            Event::WorkspaceDeleted { .. } => "workspace:deleted",
        }
    }

    /// One-line summary for tracing spans: `"{name} {primary_id}"`.
    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::AgentWorking { agent_id }
            | Event::AgentWaiting { agent_id }
            | Event::AgentFailed { agent_id, .. }
            | Event::AgentExited { agent_id, .. }
            | Event::AgentGone { agent_id }
            | Event::AgentInput { agent_id, .. }
            | Event::AgentSignal { agent_id, .. }
            | Event::AgentIdle { agent_id }
            | Event::AgentStop { agent_id }
            | Event::AgentPrompt { agent_id, .. } => {
                format!("{t} {}", agent_id.short(8))
            }
            Event::TrackerMessageReceived {
                external_session_id,
                ..
            } => format!("{t} {external_session_id}"),
            Event::SessionCreated { id, .. }
            | Event::SessionAdvanced { id, .. }
            | Event::SessionUpdated { id, .. }
            | Event::SessionResumed { id, .. }
            | Event::SessionProcedureReset { id, .. }
            | Event::SessionStopping { id }
            | Event::SessionStop { id }
            | Event::SessionEnded { id } => format!("{t} {}", id.short(8)),
            Event::RunnerSessionStarted { id, .. }
            | Event::RunnerSessionInput { id, .. }
            | Event::RunnerSessionEnded { id } => format!("{t} {}", id.short(8)),
            Event::SubroutineStarted {
                session_id,
                subroutine,
                ..
            }
            | Event::SubroutineWaiting {
                session_id,
                subroutine,
                ..
            }
            | Event::SubroutineCompleted {
                session_id,
                subroutine,
            }
            | Event::SubroutineFailed {
                session_id,
                subroutine,
                ..
            } => format!("{t} {}/{}", session_id.short(8), subroutine),
            Event::ActivityPosted { session_id, .. } => format!("{t} {}", session_id.short(8)),
            Event::TokenRefreshed { repository_id, .. } => format!("{t} {repository_id}"),
            Event::DecisionCreated { id, .. } | Event::DecisionResolved { id, .. } => {
                format!("{t} {}", id.short(8))
            }
            Event::Shutdown => t.to_string(),
            Event::TimerStart { id } => format!("{t} {id}"),
            Event::WorkspaceCreated { id, .. }
            | Event::WorkspaceReady { id }
            | Event::WorkspaceFailed { id, .. }
            | Event::WorkspaceDeleted { id } => format!("{t} {}", id.short(8)),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
