// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gemini CLI adapter: `gemini --output-format stream-json`, stdin-streaming
//! capable, stopped via SIGTERM/SIGKILL like the other non-Claude CLIs.

use super::common::SpawnedCliRunner;
use super::{RunnerAdapter, RunnerError, RunnerEvent, RunnerSpawnConfig};
use async_trait::async_trait;
use sylas_core::AgentId;
use tokio::sync::mpsc;

pub struct GeminiRunnerAdapter {
    inner: SpawnedCliRunner,
}

impl GeminiRunnerAdapter {
    pub fn new() -> Self {
        Self {
            inner: SpawnedCliRunner::new("gemini", true),
        }
    }

    fn build_args(&self, config: &RunnerSpawnConfig) -> Vec<String> {
        let mut args = vec![
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--input-format".to_string(),
            "stream-json".to_string(),
        ];
        if let Some(session_id) = &config.resume_session_id {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }
        if let Some(tools) = &config.allowed_tools {
            args.push("--allowed-tools".to_string());
            args.push(tools.join(","));
        }
        args
    }
}

impl Default for GeminiRunnerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunnerAdapter for GeminiRunnerAdapter {
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
        let args = self.build_args(&config);
        self.inner
            .spawn(config.agent_id, &config.workspace_path, &args, &config.env, &config.prompt, true)
            .await
    }

    async fn add_stream_message(&self, agent_id: &AgentId, message: &str) -> Result<(), RunnerError> {
        self.inner.send(agent_id, message).await
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
    fn build_args_requests_stream_json_both_ways() {
        let adapter = GeminiRunnerAdapter::new();
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
        let args = adapter.build_args(&config);
        assert!(args.windows(2).any(|w| w == ["--output-format", "stream-json"]));
    }
}
