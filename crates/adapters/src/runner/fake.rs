// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fake runner adapter for engine/daemon tests: records every
//! call and lets the test script a canned event stream per agent.

use super::{RunnerAdapter, RunnerError, RunnerEvent, RunnerSpawnConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use sylas_core::AgentId;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum RunnerCall {
    Start(AgentId),
    StartStreaming(AgentId),
    AddStreamMessage(AgentId, String),
    CompleteStream(AgentId),
    Stop(AgentId),
}

pub struct FakeRunnerAdapter {
    pub calls: Mutex<Vec<RunnerCall>>,
    scripts: Mutex<HashMap<AgentId, Vec<RunnerEvent>>>,
    fail_start: Mutex<Option<RunnerError>>,
}

impl FakeRunnerAdapter {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            fail_start: Mutex::new(None),
        }
    }

    /// Script the events `start`/`start_streaming` will deliver for a given
    /// agent id, in order, before the channel closes.
    pub fn script(&self, agent_id: AgentId, events: Vec<RunnerEvent>) {
        self.scripts.lock().insert(agent_id, events);
    }

    pub fn fail_next_start(&self, error: RunnerError) {
        *self.fail_start.lock() = Some(error);
    }

    async fn deliver(&self, agent_id: AgentId) -> Result<mpsc::Receiver<RunnerEvent>, RunnerError> {
        if let Some(err) = self.fail_start.lock().take() {
            return Err(err);
        }
        let events = self.scripts.lock().remove(&agent_id).unwrap_or_default();
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.send(event).await;
        }
        Ok(rx)
    }
}

impl Default for FakeRunnerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunnerAdapter for FakeRunnerAdapter {
    async fn start(
        &self,
        config: RunnerSpawnConfig,
    ) -> Result<mpsc::Receiver<RunnerEvent>, RunnerError> {
        self.calls.lock().push(RunnerCall::Start(config.agent_id.clone()));
        self.deliver(config.agent_id).await
    }

    async fn start_streaming(
        &self,
        config: RunnerSpawnConfig,
    ) -> Result<mpsc::Receiver<RunnerEvent>, RunnerError> {
        self.calls
            .lock()
            .push(RunnerCall::StartStreaming(config.agent_id.clone()));
        self.deliver(config.agent_id).await
    }

    async fn add_stream_message(&self, agent_id: &AgentId, message: &str) -> Result<(), RunnerError> {
        self.calls
            .lock()
            .push(RunnerCall::AddStreamMessage(agent_id.clone(), message.to_string()));
        Ok(())
    }

    async fn complete_stream(&self, agent_id: &AgentId) -> Result<(), RunnerError> {
        self.calls.lock().push(RunnerCall::CompleteStream(agent_id.clone()));
        Ok(())
    }

    async fn stop(&self, agent_id: &AgentId) -> Result<(), RunnerError> {
        self.calls.lock().push(RunnerCall::Stop(agent_id.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(agent_id: &str) -> RunnerSpawnConfig {
        RunnerSpawnConfig {
            agent_id: AgentId::from(agent_id),
            workspace_path: PathBuf::from("/tmp"),
            resume_session_id: None,
            prompt: "hi".into(),
            env: vec![],
            allowed_tools: None,
            disallowed_tools: None,
            mcp_configs: vec![],
        }
    }

    #[tokio::test]
    async fn scripted_events_are_delivered_in_order() {
        let fake = FakeRunnerAdapter::new();
        fake.script(
            AgentId::from("a1"),
            vec![
                RunnerEvent::AssistantDelta("hi".into()),
                RunnerEvent::Complete { exit_code: Some(0) },
            ],
        );
        let mut rx = fake.start(config("a1")).await.unwrap();
        assert_eq!(rx.recv().await, Some(RunnerEvent::AssistantDelta("hi".into())));
        assert_eq!(rx.recv().await, Some(RunnerEvent::Complete { exit_code: Some(0) }));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn fail_next_start_returns_scripted_error() {
        let fake = FakeRunnerAdapter::new();
        fake.fail_next_start(RunnerError::SpawnFailed("boom".into()));
        let result = fake.start(config("a1")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn calls_are_recorded() {
        let fake = FakeRunnerAdapter::new();
        let _ = fake.start(config("a1")).await;
        fake.stop(&AgentId::from("a1")).await.unwrap();
        let calls = fake.calls.lock();
        assert_eq!(calls.len(), 2);
    }
}
