// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tracker-service contract: a polymorphic interface over the full
//! capability set a tracker backend needs to expose, so the rest of the
//! engine never has to know whether a session's issue lives in Linear, a
//! Slack thread, or the CLI mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sylas_core::RepositoryId;
use thiserror::Error;

/// Errors a tracker-service operation can fail with.
///
/// Transport errors carry their cause; non-401 4xx surfaces verbatim;
/// `success=false` payloads become `OperationFailed` naming the op.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("transport error calling {op}: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{op} returned HTTP {status}: {body}")]
    Http {
        op: &'static str,
        status: u16,
        body: String,
    },
    #[error("{op} failed: {reason}")]
    OperationFailed { op: &'static str, reason: String },
    #[error("unauthorized (401) calling {op}")]
    Unauthorized { op: &'static str },
}

/// An issue as fetched from the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub state_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    pub title: String,
}

/// A file to upload, with its content kept out of logs.
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Result of a successful upload: the tracker-hosted asset URL.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub asset_url: String,
}

/// What kind of activity is being posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    Thought,
    Action,
    Response,
    ProcedureSelection,
    Analyzing,
}

#[derive(Debug, Clone)]
pub struct CreateActivity<'a> {
    pub external_session_id: &'a str,
    pub kind: ActivityKind,
    pub body: &'a str,
}

#[derive(Debug, Clone)]
pub struct CreatedAgentSession {
    pub external_session_id: String,
}

/// The capability set every tracker backend implements.
///
/// Implementations MUST be safe for concurrent use — the engine shares one
/// instance per repository across every session that repository owns.
#[async_trait]
pub trait TrackerService: Send + Sync {
    async fn fetch_issue(&self, issue_id: &str) -> Result<Issue, TrackerError>;

    async fn fetch_issue_children(&self, issue_id: &str) -> Result<Vec<Issue>, TrackerError>;

    async fn update_issue(
        &self,
        issue_id: &str,
        state_id: Option<&str>,
    ) -> Result<(), TrackerError>;

    async fn fetch_attachments(&self, issue_id: &str) -> Result<Vec<Attachment>, TrackerError>;

    async fn create_comment(&self, issue_id: &str, body: &str) -> Result<(), TrackerError>;

    async fn fetch_teams(&self) -> Result<Vec<Team>, TrackerError>;

    async fn fetch_workflow_states(&self, team_id: &str)
        -> Result<Vec<WorkflowState>, TrackerError>;

    async fn fetch_current_user(&self) -> Result<TrackerUser, TrackerError>;

    async fn create_agent_session_on_issue(
        &self,
        issue_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError>;

    async fn create_agent_session_on_comment(
        &self,
        issue_id: &str,
        comment_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError>;

    async fn fetch_agent_session(
        &self,
        external_session_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError>;

    async fn create_agent_activity(&self, activity: CreateActivity<'_>)
        -> Result<(), TrackerError>;

    /// Three-step dance: callers PUT `req.bytes` to the returned URL
    /// themselves via [`TrackerService::put_upload`] — kept as a separate
    /// step so the tracker-service boundary never holds large buffers
    /// longer than necessary.
    async fn request_file_upload(
        &self,
        req: &UploadRequest,
    ) -> Result<UploadedAsset, TrackerError>;

    async fn get_issue_labels(&self, issue_id: &str) -> Result<Vec<String>, TrackerError>;

    /// Which tracker kind this instance implements, for routing and logs.
    fn kind(&self) -> &'static str;
}

/// Which tracker a [`RepositoryId`]'s credential belongs to — used by the
/// refresh singleflight map key, so at most one refresh for a given
/// workspace id is ever in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceKey {
    pub tracker_kind: &'static str,
    pub workspace_id: String,
}

impl WorkspaceKey {
    pub fn new(tracker_kind: &'static str, workspace_id: impl Into<String>) -> Self {
        Self {
            tracker_kind,
            workspace_id: workspace_id.into(),
        }
    }
}

/// Associates a [`RepositoryId`] with the workspace key its credential
/// refreshes are coalesced under. Kept separate from `Repository` (core)
/// because the tracker crate owns credential plumbing, not configuration.
pub fn workspace_key_for(repository_id: &RepositoryId, tracker_kind: &'static str) -> WorkspaceKey {
    WorkspaceKey::new(tracker_kind, repository_id.as_str())
}
