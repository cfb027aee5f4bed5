// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects represent side effects the engine's pure core asks the executor
//! to perform. Keeping them as data (rather than calling adapters directly
//! from the session-advance logic) is what lets that logic stay synchronous
//! and unit-testable: tests assert on the `Vec<Effect>` a transition
//! produces instead of spinning up real child processes or HTTP calls.

use crate::agent::AgentId;
use crate::event::Event;
use crate::runner_session::RunnerSessionId;
use crate::timer::TimerId;
use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Effects that need to be executed by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    // === Event emission ===
    /// Emit an event into the system event bus (and the WAL).
    Emit { event: Event },

    // === Runner-level effects ===
    /// Spawn a runner CLI for a subroutine.
    SpawnRunner {
        agent_id: AgentId,
        runner_name: String,
        session_id: String,
        workspace_path: PathBuf,
        /// Prompt / task input for the runner's first message.
        input: String,
        /// Environment variables (API keys, model overrides).
        env: Vec<(String, String)>,
        cwd: Option<PathBuf>,
        /// Spawn with stdin left open (`start_streaming`) so a later
        /// `SendToRunner` can inject a mid-turn prompt, rather than a single
        /// non-interactive turn (`start`). False for `single_turn` subroutines.
        #[serde(default)]
        streaming: bool,
        /// Existing runner session to resume, if this subroutine has run
        /// on this runner before in the same session.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resume_runner_session_id: Option<RunnerSessionId>,
        /// Adapter-specific session configuration (MCP servers, tool allow/deny lists).
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        runner_config: HashMap<String, serde_json::Value>,
    },

    /// Send streamed input to a running runner (mid-conversation prompt injection).
    SendToRunner { agent_id: AgentId, input: String },

    /// Stop a runner (cooperative stop, falling back to SIGTERM/SIGKILL).
    StopRunner { agent_id: AgentId },

    // === Workspace effects ===
    /// Create a managed workspace (git worktree or plain directory).
    CreateWorkspace {
        workspace_id: WorkspaceId,
        path: PathBuf,
        owner: Option<String>,
        #[serde(default)]
        workspace_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repo_root: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_point: Option<String>,
    },

    /// Delete a managed workspace.
    DeleteWorkspace { workspace_id: WorkspaceId },

    // === Timer effects ===
    SetTimer {
        id: TimerId,
        #[serde(with = "duration_serde")]
        duration: Duration,
    },
    CancelTimer { id: TimerId },

    // === Tracker effects ===
    /// Post an activity entry back to the tracker.
    PostActivity {
        session_id: String,
        repository_id: String,
        /// Activity kind the tracker service should tag the entry with:
        /// "response", "action", "thought", "procedure-selection", or
        /// "analyzing" — see `sylas_tracker::service::ActivityKind`.
        #[serde(default = "default_activity_kind")]
        kind: String,
        body: String,
        /// Whether this should be posted as an internal/ops note vs. the
        /// tracker's customer-visible comment stream, when the tracker
        /// distinguishes the two (Linear does; Slack and cli-mock do not).
        #[serde(default)]
        internal: bool,
    },

    /// Upload an attachment (e.g. a diff or log excerpt) alongside an activity.
    UploadAttachment {
        session_id: String,
        repository_id: String,
        filename: String,
        content_type: String,
        bytes_len: usize,
    },

    /// Refresh an OAuth token for a repository's tracker credential.
    RefreshToken { repository_id: String },

    /// Persist the current materialized state as a snapshot (checkpoint).
    WriteSnapshot,
}

impl Effect {
    /// Effect name for log spans (e.g. "spawn_runner", "post_activity").
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Emit { .. } => "emit",
            Effect::SpawnRunner { .. } => "spawn_runner",
            Effect::SendToRunner { .. } => "send_to_runner",
            Effect::StopRunner { .. } => "stop_runner",
            Effect::CreateWorkspace { .. } => "create_workspace",
            Effect::DeleteWorkspace { .. } => "delete_workspace",
            Effect::SetTimer { .. } => "set_timer",
            Effect::CancelTimer { .. } => "cancel_timer",
            Effect::PostActivity { .. } => "post_activity",
            Effect::UploadAttachment { .. } => "upload_attachment",
            Effect::RefreshToken { .. } => "refresh_token",
            Effect::WriteSnapshot => "write_snapshot",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::Emit { event } => vec![("event", event.log_summary())],
            Effect::SpawnRunner {
                agent_id,
                runner_name,
                session_id,
                workspace_path,
                ..
            } => vec![
                ("agent_id", agent_id.to_string()),
                ("runner_name", runner_name.clone()),
                ("session_id", session_id.clone()),
                ("workspace_path", workspace_path.display().to_string()),
            ],
            Effect::SendToRunner { agent_id, .. } => vec![("agent_id", agent_id.to_string())],
            Effect::StopRunner { agent_id } => vec![("agent_id", agent_id.to_string())],
            Effect::CreateWorkspace {
                workspace_id, path, ..
            } => vec![
                ("workspace_id", workspace_id.to_string()),
                ("path", path.display().to_string()),
            ],
            Effect::DeleteWorkspace { workspace_id } => {
                vec![("workspace_id", workspace_id.to_string())]
            }
            Effect::SetTimer { id, duration } => vec![
                ("timer_id", id.to_string()),
                ("duration_ms", duration.as_millis().to_string()),
            ],
            Effect::CancelTimer { id } => vec![("timer_id", id.to_string())],
            Effect::PostActivity {
                session_id,
                kind,
                internal,
                ..
            } => vec![
                ("session_id", session_id.clone()),
                ("kind", kind.clone()),
                ("internal", internal.to_string()),
            ],
            Effect::UploadAttachment {
                session_id,
                filename,
                ..
            } => vec![
                ("session_id", session_id.clone()),
                ("filename", filename.clone()),
            ],
            Effect::RefreshToken { repository_id } => {
                vec![("repository_id", repository_id.clone())]
            }
            Effect::WriteSnapshot => vec![],
        }
    }
}

fn default_activity_kind() -> String {
    "response".to_string()
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        duration.as_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
