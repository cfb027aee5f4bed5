// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cursor CLI adapter: `cursor-agent --output-format stream-json`,
//! single-turn only, stopped via SIGTERM/SIGKILL.

use super::common::SpawnedCliRunner;
use super::{RunnerAdapter, RunnerError, RunnerEvent, RunnerSpawnConfig};
use async_trait::async_trait;
use sylas_core::AgentId;
use tokio::sync::mpsc;

pub struct CursorRunnerAdapter {
    inner: SpawnedCliRunner,
}

impl CursorRunnerAdapter {
    pub fn new() -> Self {
        Self {
            inner: SpawnedCliRunner::new("cursor-agent", false),
        }
    }

    fn build_args(&self, config: &RunnerSpawnConfig) -> Vec<String> {
        let mut args = vec!["--output-format".to_string(), "stream-json".to_string()];
        if let Some(session_id) = &config.resume_session_id {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }
        args
    }
}

impl Default for CursorRunnerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunnerAdapter for CursorRunnerAdapter {
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
        self.start(config).await
    }

    async fn add_stream_message(&self, _agent_id: &AgentId, _message: &str) -> Result<(), RunnerError> {
        Err(RunnerError::SendFailed("cursor-agent does not support streaming input".into()))
    }

    async fn complete_stream(&self, agent_id: &AgentId) -> Result<(), RunnerError> {
        self.inner.complete_stream(agent_id).await
    }

    async fn stop(&self, agent_id: &AgentId) -> Result<(), RunnerError> {
        self.inner.stop(agent_id).await
    }
}
