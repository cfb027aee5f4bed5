// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenCode CLI adapter: `opencode run --format json --stream`,
//! stdin-streaming capable, stopped via SIGTERM/SIGKILL.

use super::common::SpawnedCliRunner;
use super::{RunnerAdapter, RunnerError, RunnerEvent, RunnerSpawnConfig};
use async_trait::async_trait;
use sylas_core::AgentId;
use tokio::sync::mpsc;

pub struct OpenCodeRunnerAdapter {
    inner: SpawnedCliRunner,
}

impl OpenCodeRunnerAdapter {
    pub fn new() -> Self {
        Self {
            inner: SpawnedCliRunner::new("opencode", true),
        }
    }

    fn build_args(&self, config: &RunnerSpawnConfig) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--format".to_string(),
            "json".to_string(),
            "--stream".to_string(),
        ];
        if let Some(session_id) = &config.resume_session_id {
            args.push("--session".to_string());
            args.push(session_id.clone());
        }
        args
    }
}

impl Default for OpenCodeRunnerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunnerAdapter for OpenCodeRunnerAdapter {
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
