// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slack mirror tracker: projects a session onto a Slack thread instead of
//! a tracker issue. There is no OAuth refresh dance — bot tokens are
//! long-lived — so this implementation calls Slack's Web API directly with
//! a static bearer token.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::service::{
    ActivityKind, Attachment, CreateActivity, CreatedAgentSession, Issue, Team, TrackerError,
    TrackerService, TrackerUser, UploadRequest, UploadedAsset, WorkflowState,
};

pub struct SlackMirrorTracker {
    client: Client,
    bot_token: String,
}

impl SlackMirrorTracker {
    pub fn new(client: Client, bot_token: String) -> Self {
        Self { client, bot_token }
    }

    async fn post_json(&self, op: &'static str, method: &str, body: Value) -> Result<Value, TrackerError> {
        let resp = self
            .client
            .post(format!("https://slack.com/api/{method}"))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TrackerError::Transport { op, source: e })?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TrackerError::Unauthorized { op });
        }
        if !resp.status().is_success() {
            return Err(TrackerError::Http {
                op,
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        let json: Value = resp.json().await.map_err(|e| TrackerError::Transport { op, source: e })?;
        if json.get("ok").and_then(Value::as_bool) != Some(true) {
            return Err(TrackerError::OperationFailed {
                op,
                reason: json
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown slack error")
                    .to_string(),
            });
        }
        Ok(json)
    }

    /// `session_key` is `channel:thread_ts`.
    fn split_key(session_key: &str) -> Result<(&str, &str), TrackerError> {
        session_key
            .split_once(':')
            .ok_or_else(|| TrackerError::OperationFailed {
                op: "slack_session_key",
                reason: format!("malformed session key: {session_key}"),
            })
    }
}

#[async_trait]
impl TrackerService for SlackMirrorTracker {
    async fn fetch_issue(&self, issue_id: &str) -> Result<Issue, TrackerError> {
        // A Slack thread has no separate "issue": the thread root message
        // stands in for title/description.
        let (channel, thread_ts) = Self::split_key(issue_id)?;
        Ok(Issue {
            id: issue_id.to_string(),
            identifier: issue_id.to_string(),
            title: format!("Slack thread {thread_ts} in {channel}"),
            description: String::new(),
            labels: Vec::new(),
            assignee_id: None,
            team_id: Some(channel.to_string()),
            state_id: None,
        })
    }

    async fn fetch_issue_children(&self, _issue_id: &str) -> Result<Vec<Issue>, TrackerError> {
        Ok(Vec::new())
    }

    async fn update_issue(&self, _issue_id: &str, _state_id: Option<&str>) -> Result<(), TrackerError> {
        Ok(())
    }

    async fn fetch_attachments(&self, _issue_id: &str) -> Result<Vec<Attachment>, TrackerError> {
        Ok(Vec::new())
    }

    async fn create_comment(&self, issue_id: &str, body: &str) -> Result<(), TrackerError> {
        let (channel, thread_ts) = Self::split_key(issue_id)?;
        self.post_json(
            "create_comment",
            "chat.postMessage",
            json!({ "channel": channel, "thread_ts": thread_ts, "text": body }),
        )
        .await?;
        Ok(())
    }

    async fn fetch_teams(&self) -> Result<Vec<Team>, TrackerError> {
        Ok(Vec::new())
    }

    async fn fetch_workflow_states(&self, _team_id: &str) -> Result<Vec<WorkflowState>, TrackerError> {
        Ok(Vec::new())
    }

    async fn fetch_current_user(&self) -> Result<TrackerUser, TrackerError> {
        let body = self.post_json("fetch_current_user", "auth.test", json!({})).await?;
        Ok(TrackerUser {
            id: body.get("user_id").and_then(Value::as_str).unwrap_or_default().to_string(),
            name: body.get("user").and_then(Value::as_str).unwrap_or_default().to_string(),
            email: None,
        })
    }

    async fn create_agent_session_on_issue(
        &self,
        issue_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError> {
        Ok(CreatedAgentSession {
            external_session_id: issue_id.to_string(),
        })
    }

    async fn create_agent_session_on_comment(
        &self,
        issue_id: &str,
        _comment_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError> {
        Ok(CreatedAgentSession {
            external_session_id: issue_id.to_string(),
        })
    }

    async fn fetch_agent_session(
        &self,
        external_session_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError> {
        Ok(CreatedAgentSession {
            external_session_id: external_session_id.to_string(),
        })
    }

    async fn create_agent_activity(&self, activity: CreateActivity<'_>) -> Result<(), TrackerError> {
        // Slack has no distinct "internal activity" surface; every kind
        // mirrors as a threaded reply, prefixed so suppressed/visible
        // activity kinds stay distinguishable in the thread.
        let prefix = match activity.kind {
            ActivityKind::Thought => "_thinking:_ ",
            ActivityKind::Action => "_tool:_ ",
            ActivityKind::Response => "",
            ActivityKind::ProcedureSelection => "_routing:_ ",
            ActivityKind::Analyzing => "_analyzing:_ ",
        };
        self.create_comment(
            activity.external_session_id,
            &format!("{prefix}{}", activity.body),
        )
        .await
    }

    async fn request_file_upload(&self, req: &UploadRequest) -> Result<UploadedAsset, TrackerError> {
        Err(TrackerError::OperationFailed {
            op: "request_file_upload",
            reason: format!(
                "slack-mirror does not support attachment upload (file {})",
                req.filename
            ),
        })
    }

    async fn get_issue_labels(&self, _issue_id: &str) -> Result<Vec<String>, TrackerError> {
        Ok(Vec::new())
    }

    fn kind(&self) -> &'static str {
        "slack"
    }
}
