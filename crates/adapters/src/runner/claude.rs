// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude adapter.
//!
//! No `claude-agent-sdk` crate exists on the registry in this corpus (see
//! DESIGN.md), so Claude is spawned like the other four CLIs: the `claude`
//! binary in `--print --output-format=stream-json --input-format=stream-json`
//! mode, reading NDJSON off stdout and writing further turns to stdin for
//! streaming subroutines. It is still the one adapter that cancels
//! cooperatively via a `CancellationToken` instead of a process signal.

use super::common::SpawnedCliRunner;
use super::{RunnerAdapter, RunnerError, RunnerEvent, RunnerSpawnConfig};
use async_trait::async_trait;
use sylas_core::AgentId;
use tokio::sync::mpsc;

pub struct ClaudeRunnerAdapter {
    inner: SpawnedCliRunner,
}

impl ClaudeRunnerAdapter {
    pub fn new() -> Self {
        Self {
            inner: SpawnedCliRunner::new("claude", true),
        }
    }

    fn build_args(&self, config: &RunnerSpawnConfig) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format=stream-json".to_string(),
            "--input-format=stream-json".to_string(),
            "--verbose".to_string(),
        ];
        if let Some(session_id) = &config.resume_session_id {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }
        if let Some(tools) = &config.allowed_tools {
            args.push("--allowedTools".to_string());
            args.push(tools.join(","));
        }
        if let Some(tools) = &config.disallowed_tools {
            args.push("--disallowedTools".to_string());
            args.push(tools.join(","));
        }
        if !config.mcp_configs.is_empty() {
            let merged = super::common::merge_mcp_configs(&config.mcp_configs);
            args.push("--mcp-config".to_string());
            args.push(merged.to_string());
        }
        args
    }
}

impl Default for ClaudeRunnerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunnerAdapter for ClaudeRunnerAdapter {
    async fn start(
        &self,
        config: RunnerSpawnConfig,
    ) -> Result<mpsc::Receiver<RunnerEvent>, RunnerError> {
        let args = self.build_args(&config);
        self.inner
            .spawn(
                config.agent_id,
                &config.workspace_path,
                &args,
                &config.env,
                &config.prompt,
                false,
            )
            .await
    }

    async fn start_streaming(
        &self,
        config: RunnerSpawnConfig,
    ) -> Result<mpsc::Receiver<RunnerEvent>, RunnerError> {
        let args = self.build_args(&config);
        self.inner
            .spawn(
                config.agent_id,
                &config.workspace_path,
                &args,
                &config.env,
                &config.prompt,
                true,
            )
            .await
    }

    async fn add_stream_message(
        &self,
        agent_id: &AgentId,
        message: &str,
    ) -> Result<(), RunnerError> {
        self.inner.send(agent_id, message).await
    }

    async fn complete_stream(&self, agent_id: &AgentId) -> Result<(), RunnerError> {
        self.inner.complete_stream(agent_id).await
    }

    async fn stop(&self, agent_id: &AgentId) -> Result<(), RunnerError> {
        self.inner.cancel_immediate(agent_id).await
    }
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
