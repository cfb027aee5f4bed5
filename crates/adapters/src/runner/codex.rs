// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex CLI adapter: `codex exec --json`, single-turn only (no stdin
//! streaming support in this CLI), stopped via SIGTERM/SIGKILL.

use super::common::SpawnedCliRunner;
use super::{RunnerAdapter, RunnerError, RunnerEvent, RunnerSpawnConfig};
use async_trait::async_trait;
use sylas_core::AgentId;
use tokio::sync::mpsc;

pub struct CodexRunnerAdapter {
    inner: SpawnedCliRunner,
}

impl CodexRunnerAdapter {
    pub fn new() -> Self {
        Self {
            inner: SpawnedCliRunner::new("codex", false),
        }
    }

    fn build_args(&self, config: &RunnerSpawnConfig) -> Vec<String> {
        let mut args = vec!["exec".to_string(), "--json".to_string()];
        if let Some(session_id) = &config.resume_session_id {
            args.push("--session-id".to_string());
            args.push(session_id.clone());
        }
        args
    }
}

impl Default for CodexRunnerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunnerAdapter for CodexRunnerAdapter {
    async fn start(
        &self,
        config: RunnerSpawnConfig,
    ) -> Result<mpsc::Receiver<RunnerEvent>, RunnerError> {
        let args = self.build_args(&config);
        self.inner
            .spawn(config.agent_id, &config.workspace_path, &args, &config.env, &config.prompt, false)
            .await
    }

    async fn start_streaming(
        &self,
        config: RunnerSpawnConfig,
    ) -> Result<mpsc::Receiver<RunnerEvent>, RunnerError> {
        // Codex has no stdin-streaming mode; fall back to a single turn.
        self.start(config).await
    }

    async fn add_stream_message(&self, _agent_id: &AgentId, _message: &str) -> Result<(), RunnerError> {
        Err(RunnerError::SendFailed("codex does not support streaming input".into()))
    }

    async fn complete_stream(&self, agent_id: &AgentId) -> Result<(), RunnerError> {
        self.inner.complete_stream(agent_id).await
    }

    async fn stop(&self, agent_id: &AgentId) -> Result<(), RunnerError> {
        self.inner.stop(agent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn build_args_requests_json_exec() {
        let adapter = CodexRunnerAdapter::new();
        let config = RunnerSpawnConfig {
            agent_id: AgentId::from("a1"),
            workspace_path: PathBuf::from("/tmp"),
            resume_session_id: None,
            prompt: "hi".into(),
            env: vec![],
            allowed_tools: None,
            disallowed_tools: None,
            mcp_configs: vec![],
        };
        assert_eq!(adapter.build_args(&config), vec!["exec", "--json"]);
    }

    #[tokio::test]
    async fn add_stream_message_is_unsupported() {
        let adapter = CodexRunnerAdapter::new();
        let result = adapter.add_stream_message(&AgentId::from("a1"), "hi").await;
        assert!(result.is_err());
    }
}
