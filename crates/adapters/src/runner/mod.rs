// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform supervision of the five heterogeneous agent CLIs Sylas can drive
//! for a subroutine: Claude, Gemini, Codex, Cursor, and OpenCode.
//!
//! Every adapter spawns its CLI as a child process and is driven through the
//! same [`RunnerAdapter`] contract regardless of how that CLI actually talks
//! (NDJSON on stdout for all five, an open stdin for the ones that support
//! mid-session streaming). Callers never match on runner kind past [`spawn`].

pub mod claude;
pub mod codex;
pub mod common;
pub mod cursor;
pub mod gemini;
pub mod opencode;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use sylas_core::AgentId;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error surface shared by every runner adapter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunnerError {
    #[error("runner {0} not found")]
    NotFound(AgentId),
    #[error("failed to spawn runner: {0}")]
    SpawnFailed(String),
    #[error("failed to send to runner: {0}")]
    SendFailed(String),
    #[error("failed to stop runner: {0}")]
    StopFailed(String),
    #[error("runner process exited before completing: {0}")]
    UnexpectedExit(String),
}

/// One CLI invocation's worth of configuration: everything an adapter needs
/// to build its `Command` and interpret its output.
#[derive(Debug, Clone)]
pub struct RunnerSpawnConfig {
    pub agent_id: AgentId,
    pub workspace_path: PathBuf,
    /// Prior runner session id to resume, per [`sylas_core::Session::resume_runner`].
    pub resume_session_id: Option<String>,
    /// The subroutine's system/initial prompt.
    pub prompt: String,
    /// Extra environment variables layered on top of the adapter's own.
    pub env: Vec<(String, String)>,
    /// Tool allow/deny list for this subroutine, per the procedure table.
    pub allowed_tools: Option<Vec<String>>,
    pub disallowed_tools: Option<Vec<String>>,
    /// MCP server configs to merge into the runner's own, in the order
    /// defined by [`common::merge_mcp_configs`] (repository config wins over
    /// procedure defaults).
    pub mcp_configs: Vec<serde_json::Value>,
}

/// A structured event surfaced by a runner while it works. These are the
/// inputs to the activity relay; they are deliberately coarser-grained than
/// the wire protocol of any one CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    /// The runner announced its session id (first message of the stream).
    SessionId(String),
    /// An incremental assistant-text delta.
    AssistantDelta(String),
    /// A tool invocation the assistant made.
    ToolUse { name: String, input: serde_json::Value },
    /// A "thinking"/reasoning delta, suppressed from relay for most
    /// subroutines under the activity relay's suppression rules.
    Thought(String),
    /// The runner is blocked on a question, approval, or permission gate.
    Waiting { prompt: String },
    /// Terminal: the runner finished this turn of work. Only emitted after
    /// the process has actually exited, so a result is never reported
    /// while the child could still change its mind.
    Complete { exit_code: Option<i32> },
    /// Terminal: the runner failed (auth, credits, network, rate limit).
    Failed(String),
}

/// The uniform contract every per-CLI adapter implements. One adapter
/// instance handles many concurrent runner invocations, tracked internally
/// by [`RunnerSpawnConfig::agent_id`].
#[async_trait]
pub trait RunnerAdapter: Send + Sync {
    /// Spawn the CLI for a single, non-interactive turn: write the prompt,
    /// close stdin, and emit events until the process exits.
    async fn start(
        &self,
        config: RunnerSpawnConfig,
    ) -> Result<mpsc::Receiver<RunnerEvent>, RunnerError>;

    /// Spawn the CLI with stdin left open so [`add_stream_message`] can
    /// inject further user turns mid-session (streaming subroutines only).
    async fn start_streaming(
        &self,
        config: RunnerSpawnConfig,
    ) -> Result<mpsc::Receiver<RunnerEvent>, RunnerError>;

    /// Write one more user message into an already-streaming runner.
    async fn add_stream_message(&self, agent_id: &AgentId, message: &str)
        -> Result<(), RunnerError>;

    /// Tell a streaming runner its turn is over (closes stdin or sends the
    /// CLI's own end-of-turn marker, depending on adapter).
    async fn complete_stream(&self, agent_id: &AgentId) -> Result<(), RunnerError>;

    /// Stop a runner: `CancellationToken::cancel()` for Claude, SIGTERM then
    /// (after [`crate::subprocess::RUNNER_STOP_GRACE`]) SIGKILL for the rest.
    async fn stop(&self, agent_id: &AgentId) -> Result<(), RunnerError>;
}

/// Extra, adapter-specific key/value pairs threaded through
/// `Effect::SpawnRunner::runner_config` (see `sylas_core::effect::Effect`).
pub type RunnerConfig = HashMap<String, serde_json::Value>;
