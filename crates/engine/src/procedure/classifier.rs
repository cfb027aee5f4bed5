// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lightweight request classification: at most one runner turn, a short
//! time budget, and exactly one label out of [`super::KNOWN_LABELS`].

use crate::error::RuntimeError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sylas_core::AgentId;
use sylas_runners::{RunnerAdapter, RunnerEvent, RunnerSpawnConfig};
use tokio::time::{timeout, Instant};

/// Wall-clock budget for a single classification call.
pub const CLASSIFIER_BUDGET: Duration = Duration::from_secs(10);

const PROMPT_PREAMBLE: &str = "Classify the request below into exactly one label from: \
question, documentation, transient, planning, code, debugger, orchestrator, user-testing, \
release. Respond with only the label, nothing else.\n\nRequest:\n";

/// Runs the classification turn against a single runner adapter. Any
/// failure (spawn error, timeout, unrecognised label) is the caller's cue
/// to fall back to `full-development` per the classification error policy.
pub struct Classifier {
    runner: Arc<dyn RunnerAdapter>,
    workspace_path: PathBuf,
}

impl Classifier {
    pub fn new(runner: Arc<dyn RunnerAdapter>, workspace_path: PathBuf) -> Self {
        Self {
            runner,
            workspace_path,
        }
    }

    pub async fn classify(&self, request_text: &str) -> Result<String, RuntimeError> {
        let agent_id = AgentId::new(format!("classifier-{}", uuid::Uuid::new_v4()));
        let config = RunnerSpawnConfig {
            agent_id: agent_id.clone(),
            workspace_path: self.workspace_path.clone(),
            resume_session_id: None,
            prompt: format!("{PROMPT_PREAMBLE}{request_text}"),
            env: Vec::new(),
            allowed_tools: Some(Vec::new()),
            disallowed_tools: None,
            mcp_configs: Vec::new(),
        };

        let mut rx = timeout(CLASSIFIER_BUDGET, self.runner.start(config))
            .await
            .map_err(|_| RuntimeError::ClassifierFailed("timed out spawning classifier".into()))?
            .map_err(|e| RuntimeError::ClassifierFailed(e.to_string()))?;

        let deadline = Instant::now() + CLASSIFIER_BUDGET;
        let mut text = String::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RuntimeError::ClassifierFailed(
                    "classifier exceeded its turn budget".into(),
                ));
            }
            match timeout(remaining, rx.recv()).await {
                Ok(Some(RunnerEvent::AssistantDelta(delta))) => text.push_str(&delta),
                Ok(Some(RunnerEvent::Complete { .. })) | Ok(None) => break,
                Ok(Some(RunnerEvent::Failed(message))) => {
                    return Err(RuntimeError::ClassifierFailed(message))
                }
                Ok(Some(_)) => {}
                Err(_) => {
                    return Err(RuntimeError::ClassifierFailed(
                        "classifier exceeded its turn budget".into(),
                    ))
                }
            }
        }

        parse_label(&text)
    }
}

fn parse_label(text: &str) -> Result<String, RuntimeError> {
    let lowered = text.to_lowercase();
    super::KNOWN_LABELS
        .iter()
        .find(|label| lowered.contains(*label))
        .map(|label| (*label).to_string())
        .ok_or_else(|| RuntimeError::UnknownLabel(text.trim().to_string()))
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
