// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identifier and state machine.
//!
//! A [`Session`] is the durable record of one issue-tracker thread being
//! worked by Sylas: which procedure it is running, which subroutine is
//! current, and the retry/validation bookkeeping needed to drive it forward.
//! It is keyed by [`ExternalSessionId`] — the tracker's own id for the
//! issue/thread — because that is the value every inbound webhook carries.

use crate::action_tracker::ActionTracker;
use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

pub use crate::action_tracker::AgentSignal;

crate::define_id! {
    /// Unique identifier for a session instance (Sylas's own id, distinct
    /// from the tracker's id for the same issue).
    #[derive(Default)]
    pub struct SessionId;
}

crate::define_id! {
    /// The tracker's identifier for the issue/thread this session tracks.
    ///
    /// Linear issue ids, a Slack thread's `(channel, ts)` pair joined with a
    /// separator, and the CLI mock's synthetic ids are all represented as
    /// this opaque string. The session table is keyed on this value so an
    /// inbound webhook can find its session without a round trip.
    pub struct ExternalSessionId;
}

/// Session-level status: coarser than [`SubroutineStatus`], which tracks
/// the current subroutine's own progress. This is what the operator CLI
/// and `/status` endpoint show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Allocated but no runner has started yet.
    Pending,
    /// A runner is actively working the current subroutine.
    Active,
    /// Waiting on a human decision (question, escalation, idle nudge).
    AwaitingInput,
    /// Current subroutine has `requires_approval` and completed; waiting
    /// for an explicit user-prompt message to advance.
    AwaitingApproval,
    /// Shutdown or stop requested; runner cancellation in flight.
    Completing,
    /// Terminal. Any further event for this external session id is a no-op.
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::AwaitingInput => write!(f, "awaiting_input"),
            SessionStatus::AwaitingApproval => write!(f, "awaiting_approval"),
            SessionStatus::Completing => write!(f, "completing"),
            SessionStatus::Ended => write!(f, "ended"),
        }
    }
}

/// Status of the current subroutine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubroutineStatus {
    /// Waiting to start
    Pending,
    /// Runner is actively working
    Running,
    /// Waiting for external input (optional decision_id)
    Waiting(Option<String>),
    /// Subroutine completed
    Completed,
    /// Subroutine failed
    Failed,
}

impl SubroutineStatus {
    pub fn is_waiting(&self) -> bool {
        matches!(self, SubroutineStatus::Waiting(_))
    }
}

impl fmt::Display for SubroutineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubroutineStatus::Pending => write!(f, "pending"),
            SubroutineStatus::Running => write!(f, "running"),
            SubroutineStatus::Waiting(_) => write!(f, "waiting"),
            SubroutineStatus::Completed => write!(f, "completed"),
            SubroutineStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a completed or in-progress subroutine (for history).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubroutineOutcome {
    Running,
    Completed,
    Failed(String),
    Waiting(String),
}

/// Tag-only variant of [`SubroutineStatus`] for protocol DTOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubroutineStatusKind {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    /// Orphaned session detected from a crash-recovery sweep.
    Orphaned,
}

impl From<&SubroutineStatus> for SubroutineStatusKind {
    fn from(s: &SubroutineStatus) -> Self {
        match s {
            SubroutineStatus::Pending => SubroutineStatusKind::Pending,
            SubroutineStatus::Running => SubroutineStatusKind::Running,
            SubroutineStatus::Waiting(_) => SubroutineStatusKind::Waiting,
            SubroutineStatus::Completed => SubroutineStatusKind::Completed,
            SubroutineStatus::Failed => SubroutineStatusKind::Failed,
        }
    }
}

impl fmt::Display for SubroutineStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubroutineStatusKind::Pending => write!(f, "pending"),
            SubroutineStatusKind::Running => write!(f, "running"),
            SubroutineStatusKind::Waiting => write!(f, "waiting"),
            SubroutineStatusKind::Completed => write!(f, "completed"),
            SubroutineStatusKind::Failed => write!(f, "failed"),
            SubroutineStatusKind::Orphaned => write!(f, "orphaned"),
        }
    }
}

/// Tag-only variant of [`SubroutineOutcome`] for protocol DTOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubroutineOutcomeKind {
    Running,
    Completed,
    Failed,
    Waiting,
}

impl From<&SubroutineOutcome> for SubroutineOutcomeKind {
    fn from(o: &SubroutineOutcome) -> Self {
        match o {
            SubroutineOutcome::Running => SubroutineOutcomeKind::Running,
            SubroutineOutcome::Completed => SubroutineOutcomeKind::Completed,
            SubroutineOutcome::Failed(_) => SubroutineOutcomeKind::Failed,
            SubroutineOutcome::Waiting(_) => SubroutineOutcomeKind::Waiting,
        }
    }
}

/// Record of one subroutine's execution (for session history).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubroutineRecord {
    pub name: String,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
    pub outcome: SubroutineOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Runner name this subroutine ran on (e.g. "claude", "codex").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_name: Option<String>,
}

/// Configuration for creating a new session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub id: String,
    pub external_session_id: String,
    pub repository_id: String,
    pub procedure_kind: String,
    pub vars: HashMap<String, String>,
    pub procedure_hash: String,
    pub cwd: PathBuf,
    pub initial_subroutine: String,
    /// Labels snapshot taken off the issue at session-creation time.
    /// Retained across procedure resets so a label-driven procedure
    /// override (e.g. the `orchestrator` label) survives a later
    /// re-classification rather than being lost once the triggering
    /// webhook has been handled.
    pub labels: Vec<String>,
}

/// Maximum number of times any single subroutine can be entered before the
/// session is failed with a circuit-breaker error. Prevents runaway retry
/// cycles (e.g. validate -> fix -> validate looping indefinitely beyond the
/// validation-loop cap already enforced by the procedure engine).
pub const MAX_SUBROUTINE_VISITS: u32 = 25;

/// A session instance: one tracker issue being driven through a procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub external_session_id: String,
    pub repository_id: String,
    /// Which procedure definition this session is running (e.g. "bugfix").
    pub procedure_kind: String,
    /// Coarse session-level status; authoritative over the sink-subroutine-
    /// name sniffing `is_terminal` used to rely on.
    #[serde(default = "default_session_status")]
    pub status: SessionStatus,
    /// Current subroutine name (from the procedure definition)
    pub subroutine: String,
    pub subroutine_status: SubroutineStatus,
    #[serde(skip, default = "Instant::now")]
    pub subroutine_started_at: Instant,
    /// The in-flight subroutine's own record, not yet historized. Only once
    /// [`Session::push_subroutine`] moves past it does it land in `history` -
    /// so the subroutine currently running never appears there, and the
    /// final subroutine of a terminated procedure never appears there until
    /// a later prompt re-initializes the session.
    #[serde(default = "default_current_record")]
    pub current: SubroutineRecord,
    /// Subroutines the session has already advanced away from.
    #[serde(default)]
    pub history: Vec<SubroutineRecord>,
    pub vars: HashMap<String, String>,
    /// Labels snapshot taken off the issue at session-creation time;
    /// consulted again on every procedure reset so a label override
    /// keeps applying across prompts.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Content hash of the procedure table this session was created under.
    pub procedure_hash: String,
    pub cwd: PathBuf,
    /// Reference to the workspace (managed git worktree) this session uses.
    pub workspace_id: Option<WorkspaceId>,
    pub workspace_path: Option<PathBuf>,
    /// Id of the runner's own session/conversation, once one has started.
    pub runner_session_id: Option<String>,
    /// Per-runner-kind session ids remembered across procedure resets, so a
    /// session that has run subroutines on more than one runner (e.g. a
    /// classifier on claude, then a fix on gemini) can resume each on its
    /// own runner rather than bleeding one runner's conversation into
    /// another. Keyed by runner name ("claude", "gemini", "codex", "cursor",
    /// "opencode").
    #[serde(default)]
    pub runner_session_ids: HashMap<String, String>,
    #[serde(skip, default = "Instant::now")]
    pub created_at: Instant,
    pub error: Option<String>,
    /// Action attempt tracking and agent signal state.
    #[serde(flatten)]
    pub action_tracker: ActionTracker,
    /// True while running an on_cancel cleanup subroutine.
    #[serde(default)]
    pub cancelling: bool,
    pub total_retries: u32,
    /// Tracks how many times each subroutine has been entered.
    #[serde(default)]
    pub subroutine_visits: HashMap<String, u32>,
    /// Current iteration of the validation loop (spec default cap 3).
    #[serde(default)]
    pub validation_iteration: u32,
    /// Log file size recorded when the idle grace timer was armed, used to
    /// detect runner activity during the grace window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_grace_log_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_nudge_at: Option<u64>,
}

fn default_session_status() -> SessionStatus {
    SessionStatus::Pending
}

/// Fallback for snapshots written before `current` existed. Old snapshots
/// folded the in-flight subroutine into the last `history` entry instead;
/// there is no sibling-field access in a serde default, so this can't
/// recover the lost name. Sessions resumed from such a snapshot re-init on
/// the next prompt regardless, which supersedes whatever this placeholder
/// holds.
fn default_current_record() -> SubroutineRecord {
    SubroutineRecord {
        name: String::new(),
        started_at_ms: 0,
        finished_at_ms: None,
        outcome: SubroutineOutcome::Running,
        agent_id: None,
        runner_name: None,
    }
}

impl Session {
    pub fn new(config: SessionConfig, epoch_ms: u64) -> Self {
        Self {
            id: config.id,
            external_session_id: config.external_session_id,
            repository_id: config.repository_id,
            procedure_kind: config.procedure_kind,
            status: SessionStatus::Pending,
            subroutine: config.initial_subroutine.clone(),
            subroutine_status: SubroutineStatus::Pending,
            subroutine_started_at: Instant::now(),
            current: SubroutineRecord {
                name: config.initial_subroutine,
                started_at_ms: epoch_ms,
                finished_at_ms: None,
                outcome: SubroutineOutcome::Running,
                agent_id: None,
                runner_name: None,
            },
            history: Vec::new(),
            vars: config.vars,
            labels: config.labels,
            procedure_hash: config.procedure_hash,
            cwd: config.cwd,
            workspace_id: None,
            workspace_path: None,
            runner_session_id: None,
            runner_session_ids: HashMap::new(),
            created_at: Instant::now(),
            error: None,
            action_tracker: ActionTracker::default(),
            cancelling: false,
            total_retries: 0,
            subroutine_visits: HashMap::new(),
            validation_iteration: 0,
            idle_grace_log_size: None,
            last_nudge_at: None,
        }
    }

    pub fn finalize_current_subroutine(&mut self, outcome: SubroutineOutcome, epoch_ms: u64) {
        if self.current.finished_at_ms.is_none() {
            self.current.finished_at_ms = Some(epoch_ms);
            self.current.outcome = outcome;
        }
    }

    pub fn update_current_subroutine_outcome(&mut self, outcome: SubroutineOutcome) {
        if self.current.finished_at_ms.is_none() {
            self.current.outcome = outcome;
        }
    }

    /// Moves the now-finalized `current` record into `history` and starts a
    /// fresh `Running` record for `name`. Callers finalize `current` (via
    /// [`Session::finalize_current_subroutine`]) before calling this, so the
    /// record pushed into `history` is the one just advanced away from, not
    /// the one being advanced to.
    pub fn push_subroutine(&mut self, name: &str, epoch_ms: u64) {
        let finished = std::mem::replace(
            &mut self.current,
            SubroutineRecord {
                name: name.to_string(),
                started_at_ms: epoch_ms,
                finished_at_ms: None,
                outcome: SubroutineOutcome::Running,
                agent_id: None,
                runner_name: None,
            },
        );
        self.history.push(finished);
    }

    pub fn set_current_subroutine_agent_id(&mut self, agent_id: &str) {
        if self.current.finished_at_ms.is_none() {
            self.current.agent_id = Some(agent_id.to_string());
        }
    }

    pub fn set_current_subroutine_runner_name(&mut self, runner_name: &str) {
        if self.current.finished_at_ms.is_none() {
            self.current.runner_name = Some(runner_name.to_string());
        }
    }

    /// A session is terminal once its status reaches [`SessionStatus::Ended`].
    pub fn is_terminal(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    pub fn with_workspace(mut self, id: WorkspaceId, path: PathBuf) -> Self {
        self.workspace_id = Some(id);
        self.workspace_path = Some(path);
        self
    }

    pub fn with_runner_session(mut self, id: String) -> Self {
        self.runner_session_id = Some(id);
        self.subroutine_status = SubroutineStatus::Running;
        self
    }

    /// Runner kinds in the priority order `advance` uses to decide which
    /// per-runner slot a completed subroutine's runner session id belongs
    /// in: whichever is set on the session, opencode wins over cursor, which
    /// wins over codex, then gemini, then claude.
    pub const RUNNER_PRIORITY: [&'static str; 5] =
        ["opencode", "cursor", "codex", "gemini", "claude"];

    /// Record a runner session id for a specific runner kind, keeping the
    /// flattened `runner_session_id` field in sync for whichever runner the
    /// session is currently running on.
    pub fn set_runner_session_id(&mut self, runner_name: &str, id: String) {
        self.runner_session_id = Some(id.clone());
        self.runner_session_ids.insert(runner_name.to_string(), id);
    }

    /// The previously-recorded runner session id for `runner_name`, if this
    /// session has ever run a subroutine on that runner before.
    pub fn runner_session_id_for(&self, runner_name: &str) -> Option<&str> {
        self.runner_session_ids.get(runner_name).map(String::as_str)
    }

    /// The runner kind + session id a resume should use, selected from
    /// whichever per-runner slots are set by [`Self::RUNNER_PRIORITY`].
    /// Returns `None` for a session that has never run a subroutine yet.
    pub fn resume_runner(&self) -> Option<(&str, &str)> {
        Self::RUNNER_PRIORITY.iter().find_map(|runner| {
            self.runner_session_ids
                .get(*runner)
                .map(|id| (*runner, id.as_str()))
        })
    }

    pub fn increment_action_attempt(&mut self, trigger: &str, chain_pos: usize) -> u32 {
        let count = self
            .action_tracker
            .increment_action_attempt(trigger, chain_pos);
        if count > 1 {
            self.total_retries += 1;
        }
        count
    }

    pub fn get_action_attempt(&self, trigger: &str, chain_pos: usize) -> u32 {
        self.action_tracker.get_action_attempt(trigger, chain_pos)
    }

    pub fn reset_action_attempts(&mut self) {
        self.action_tracker.reset_action_attempts();
    }

    pub fn clear_agent_signal(&mut self) {
        self.action_tracker.clear_agent_signal();
    }

    /// Record a visit to a subroutine. Returns the new visit count.
    pub fn record_subroutine_visit(&mut self, subroutine: &str) -> u32 {
        let count = self.subroutine_visits.entry(subroutine.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get_subroutine_visits(&self, subroutine: &str) -> u32 {
        self.subroutine_visits.get(subroutine).copied().unwrap_or(0)
    }

    /// Bump the validation-loop counter, returning the new iteration count.
    /// The procedure engine compares this against the configured cap
    /// (default 3) to decide whether to escalate instead of looping again.
    pub fn increment_validation_iteration(&mut self) -> u32 {
        self.validation_iteration += 1;
        self.validation_iteration
    }

    pub fn reset_validation_iteration(&mut self) {
        self.validation_iteration = 0;
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
