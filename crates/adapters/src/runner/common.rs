// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers used by every per-CLI runner adapter: incremental NDJSON
//! accumulation, deferred result emission, and MCP config merging.
//!
//! Reads only the bytes appended since the last poll and keeps the last
//! complete line around across partial reads. Here the "file" is a child
//! process's stdout pipe rather than a JSONL log on disk, so the
//! accumulator consumes a `BufRead` line-by-line instead of seeking by
//! offset, but the core invariant is the same: never re-emit a line already
//! delivered, and never emit a result event until the process has actually
//! exited.

use super::RunnerEvent;
use std::collections::VecDeque;

/// Accumulates partial assistant-text deltas into a single running buffer so
/// the activity relay can post growing "latest text" updates rather than one
/// event per token, and holds back the terminal `Complete`/`Failed` event
/// until [`DeltaAccumulator::mark_exited`] has been called.
///
/// State transitions are only trusted once corroborated by process
/// liveness: a CLI's own stream can claim "done" mid-output on a race, so
/// the adapter defers the terminal event to the `wait()` on the child.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    text: String,
    pending_terminal: Option<RunnerEvent>,
    exited: bool,
    queue: VecDeque<RunnerEvent>,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one parsed line's worth of event. Non-terminal events are
    /// queued for immediate delivery; terminal events are held until the
    /// process exit is observed.
    pub fn push(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::AssistantDelta(ref delta) => {
                self.text.push_str(delta);
                self.queue.push_back(event);
            }
            RunnerEvent::Complete { .. } | RunnerEvent::Failed(_) => {
                self.pending_terminal = Some(event);
            }
            other => self.queue.push_back(other),
        }
    }

    /// Record that the child process has exited. Releases any terminal
    /// event that was being withheld.
    pub fn mark_exited(&mut self, exit_code: Option<i32>) {
        self.exited = true;
        if self.pending_terminal.is_none() {
            self.pending_terminal = Some(RunnerEvent::Complete { exit_code });
        }
    }

    /// Drain whatever is ready to deliver right now, releasing the terminal
    /// event only once the process has exited.
    pub fn drain_ready(&mut self) -> Vec<RunnerEvent> {
        let mut out: Vec<RunnerEvent> = self.queue.drain(..).collect();
        if self.exited {
            if let Some(terminal) = self.pending_terminal.take() {
                out.push(terminal);
            }
        }
        out
    }

    pub fn accumulated_text(&self) -> &str {
        &self.text
    }
}

/// Merge procedure-default MCP server configs with repository-specific
/// overrides, in the ordered-merge sense: later entries with the same
/// top-level key replace earlier ones, but unrelated keys from earlier
/// entries are preserved (an `IndexMap`-style last-write-wins over a union
/// of keys, not a wholesale replace).
pub fn merge_mcp_configs(configs: &[serde_json::Value]) -> serde_json::Value {
    let mut merged = serde_json::Map::new();
    for config in configs {
        if let Some(obj) = config.as_object() {
            for (k, v) in obj {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    serde_json::Value::Object(merged)
}

/// Parse one line of a CLI's NDJSON stream into a [`RunnerEvent`], given the
/// field names used by Claude/Gemini/Cursor's `stream-json` formats: a
/// `type` discriminant of `assistant` | `tool_use` | `thinking` | `result` |
/// `error`.
pub fn parse_stream_json_line(line: &str) -> Option<RunnerEvent> {
    let json: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    let kind = json.get("type")?.as_str()?;
    match kind {
        "system" => json
            .get("session_id")
            .and_then(|v| v.as_str())
            .map(|id| RunnerEvent::SessionId(id.to_string())),
        "assistant" => {
            let content = json.get("message")?.get("content")?.as_array()?;
            let mut text = String::new();
            let mut tool: Option<RunnerEvent> = None;
            for item in content {
                match item.get("type").and_then(|v| v.as_str()) {
                    Some("text") => {
                        if let Some(t) = item.get("text").and_then(|v| v.as_str()) {
                            text.push_str(t);
                        }
                    }
                    Some("thinking") => {
                        if let Some(t) = item.get("thinking").and_then(|v| v.as_str()) {
                            return Some(RunnerEvent::Thought(t.to_string()));
                        }
                    }
                    Some("tool_use") => {
                        let name = item
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown")
                            .to_string();
                        let input = item.get("input").cloned().unwrap_or(serde_json::Value::Null);
                        tool = Some(RunnerEvent::ToolUse { name, input });
                    }
                    _ => {}
                }
            }
            if !text.is_empty() {
                Some(RunnerEvent::AssistantDelta(text))
            } else {
                tool
            }
        }
        "result" => {
            let is_error = json.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false);
            if is_error {
                let reason = json
                    .get("result")
                    .and_then(|v| v.as_str())
                    .unwrap_or("runner reported an error")
                    .to_string();
                Some(RunnerEvent::Failed(reason))
            } else {
                Some(RunnerEvent::Complete { exit_code: Some(0) })
            }
        }
        "error" => {
            let reason = json
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown runner error")
                .to_string();
            Some(RunnerEvent::Failed(reason))
        }
        _ => None,
    }
}

/// Generic spawn-a-CLI-and-stream-NDJSON machinery shared by every
/// per-runner adapter. Each adapter module (`claude.rs`, `gemini.rs`, ...)
/// is a thin configuration of this type: it supplies the binary name, the
/// CLI flags that select NDJSON streaming mode, and whether the CLI
/// supports stdin-open streaming at all.
///
/// Grounded on `oj-adapters::agent::claude::ClaudeAgentAdapter`'s registry
/// pattern (`Arc<Mutex<HashMap<AgentId, AgentInfo>>>` plus a background
/// watcher task per agent) but replaces the tmux/TUI transport with a plain
/// `tokio::process::Child` whose stdout is read line-by-line.
pub struct SpawnedCliRunner {
    pub(crate) binary: String,
    pub(crate) supports_streaming: bool,
    handles: parking_lot::Mutex<std::collections::HashMap<sylas_core::AgentId, RunnerHandle>>,
}

pub(crate) struct RunnerHandle {
    pub(crate) stdin: Option<tokio::process::ChildStdin>,
    pub(crate) cancel: tokio_util::sync::CancellationToken,
    pub(crate) child_id: Option<u32>,
}

impl SpawnedCliRunner {
    pub fn new(binary: impl Into<String>, supports_streaming: bool) -> Self {
        Self {
            binary: binary.into(),
            supports_streaming,
            handles: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Spawn `self.binary` with `args`, wire stdout into a background task
    /// that parses NDJSON lines via [`parse_stream_json_line`] and forwards
    /// [`RunnerEvent`]s through the returned channel, and register the
    /// handle under `agent_id` so later `add_stream_message`/`stop` calls
    /// can find it.
    pub async fn spawn(
        &self,
        agent_id: sylas_core::AgentId,
        workspace_path: &std::path::Path,
        args: &[String],
        env: &[(String, String)],
        initial_prompt: &str,
        keep_stdin_open: bool,
    ) -> Result<tokio::sync::mpsc::Receiver<RunnerEvent>, super::RunnerError> {
        use std::process::Stdio;
        use tokio::io::AsyncWriteExt;

        if keep_stdin_open && !self.supports_streaming {
            return Err(super::RunnerError::SpawnFailed(format!(
                "{} does not support streaming input",
                self.binary
            )));
        }

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args)
            .current_dir(workspace_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| super::RunnerError::SpawnFailed(format!("{}: {e}", self.binary)))?;
        let child_id = child.id();

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| super::RunnerError::SpawnFailed("no stdin".into()))?;
        stdin
            .write_all(initial_prompt.as_bytes())
            .await
            .map_err(|e| super::RunnerError::SpawnFailed(format!("write prompt: {e}")))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| super::RunnerError::SpawnFailed(format!("write prompt: {e}")))?;
        if !keep_stdin_open {
            drop(stdin);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| super::RunnerError::SpawnFailed("no stdout".into()))?;

        let cancel = tokio_util::sync::CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::channel(128);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            use tokio::io::{AsyncBufReadExt, BufReader};
            let mut lines = BufReader::new(stdout).lines();
            let mut acc = DeltaAccumulator::new();
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        let _ = child.start_kill();
                        break;
                    }
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                if let Some(event) = parse_stream_json_line(&line) {
                                    acc.push(event);
                                    for ready in acc.drain_ready() {
                                        if tx.send(ready).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                            }
                            Ok(None) => break,
                            Err(_) => break,
                        }
                    }
                }
            }
            let status = child.wait().await.ok();
            acc.mark_exited(status.and_then(|s| s.code()));
            for ready in acc.drain_ready() {
                let _ = tx.send(ready).await;
            }
        });

        self.handles.lock().insert(
            agent_id,
            RunnerHandle {
                stdin: if keep_stdin_open { Some(stdin) } else { None },
                cancel,
                child_id,
            },
        );

        Ok(rx)
    }

    pub async fn send(
        &self,
        agent_id: &sylas_core::AgentId,
        message: &str,
    ) -> Result<(), super::RunnerError> {
        use tokio::io::AsyncWriteExt;
        let stdin = {
            let mut handles = self.handles.lock();
            let handle = handles
                .get_mut(agent_id)
                .ok_or_else(|| super::RunnerError::NotFound(agent_id.clone()))?;
            handle.stdin.take()
        };
        let Some(mut stdin) = stdin else {
            return Err(super::RunnerError::SendFailed(
                "runner does not support streaming input".into(),
            ));
        };
        let result = async {
            stdin.write_all(message.as_bytes()).await?;
            stdin.write_all(b"\n").await
        }
        .await;
        if let Some(handle) = self.handles.lock().get_mut(agent_id) {
            handle.stdin = Some(stdin);
        }
        result.map_err(|e| super::RunnerError::SendFailed(e.to_string()))
    }

    pub async fn complete_stream(
        &self,
        agent_id: &sylas_core::AgentId,
    ) -> Result<(), super::RunnerError> {
        let mut handles = self.handles.lock();
        let handle = handles
            .get_mut(agent_id)
            .ok_or_else(|| super::RunnerError::NotFound(agent_id.clone()))?;
        handle.stdin = None;
        Ok(())
    }

    /// Claude-only: cancel the background parse loop cooperatively via its
    /// `CancellationToken` rather than signalling the process, giving
    /// "AbortController"-style cancellation without killing the child.
    pub async fn cancel_immediate(
        &self,
        agent_id: &sylas_core::AgentId,
    ) -> Result<(), super::RunnerError> {
        let handle = self
            .handles
            .lock()
            .remove(agent_id)
            .ok_or_else(|| super::RunnerError::NotFound(agent_id.clone()))?;
        handle.cancel.cancel();
        Ok(())
    }

    /// Cancel the background task for Claude-style cooperative cancellation,
    /// or SIGTERM the process and let [`crate::subprocess::RUNNER_STOP_GRACE`]
    /// elapse before the `kill_on_drop`/`CancellationToken` fallback takes
    /// over for the rest.
    pub async fn stop(&self, agent_id: &sylas_core::AgentId) -> Result<(), super::RunnerError> {
        let handle = self
            .handles
            .lock()
            .remove(agent_id)
            .ok_or_else(|| super::RunnerError::NotFound(agent_id.clone()))?;
        if let Some(pid) = handle.child_id {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
            let cancel = handle.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(crate::subprocess::RUNNER_STOP_GRACE).await;
                cancel.cancel();
            });
        } else {
            handle.cancel.cancel();
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "common_tests.rs"]
mod tests;
