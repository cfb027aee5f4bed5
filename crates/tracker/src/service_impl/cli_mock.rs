// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `cli-mock` tracker: an in-memory stand-in for Linear used by the
//! `sylas mock` operator command and integration tests, so the whole
//! ingress→session→runner→activity pipeline can be exercised without a real
//! tracker.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::service::{
    ActivityKind, Attachment, CreateActivity, CreatedAgentSession, Issue, Team, TrackerError,
    TrackerService, TrackerUser, UploadRequest, UploadedAsset, WorkflowState,
};

#[derive(Debug, Clone)]
pub struct MockActivity {
    pub external_session_id: String,
    pub kind: ActivityKind,
    pub body: String,
}

#[derive(Default)]
struct Inner {
    issues: HashMap<String, Issue>,
    activities: Vec<MockActivity>,
    sessions: HashMap<String, String>, // external_session_id -> issue_id
}

/// In-memory tracker. Activities and issue mutations are kept so a CLI
/// operator (or a test) can inspect what the engine would have posted.
pub struct CliMockTracker {
    inner: Mutex<Inner>,
}

impl CliMockTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn seed_issue(&self, issue: Issue) {
        self.inner.lock().issues.insert(issue.id.clone(), issue);
    }

    pub fn activities(&self) -> Vec<MockActivity> {
        self.inner.lock().activities.clone()
    }
}

impl Default for CliMockTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackerService for CliMockTracker {
    async fn fetch_issue(&self, issue_id: &str) -> Result<Issue, TrackerError> {
        self.inner
            .lock()
            .issues
            .get(issue_id)
            .cloned()
            .ok_or_else(|| TrackerError::OperationFailed {
                op: "fetch_issue",
                reason: format!("no such mock issue: {issue_id}"),
            })
    }

    async fn fetch_issue_children(&self, _issue_id: &str) -> Result<Vec<Issue>, TrackerError> {
        Ok(Vec::new())
    }

    async fn update_issue(&self, issue_id: &str, state_id: Option<&str>) -> Result<(), TrackerError> {
        let mut inner = self.inner.lock();
        let issue = inner
            .issues
            .get_mut(issue_id)
            .ok_or_else(|| TrackerError::OperationFailed {
                op: "update_issue",
                reason: format!("no such mock issue: {issue_id}"),
            })?;
        issue.state_id = state_id.map(str::to_string);
        Ok(())
    }

    async fn fetch_attachments(&self, _issue_id: &str) -> Result<Vec<Attachment>, TrackerError> {
        Ok(Vec::new())
    }

    async fn create_comment(&self, issue_id: &str, body: &str) -> Result<(), TrackerError> {
        self.inner.lock().activities.push(MockActivity {
            external_session_id: issue_id.to_string(),
            kind: ActivityKind::Response,
            body: body.to_string(),
        });
        Ok(())
    }

    async fn fetch_teams(&self) -> Result<Vec<Team>, TrackerError> {
        Ok(vec![Team {
            id: "mock-team".into(),
            name: "Mock Team".into(),
            key: "MOCK".into(),
        }])
    }

    async fn fetch_workflow_states(&self, _team_id: &str) -> Result<Vec<WorkflowState>, TrackerError> {
        Ok(vec![
            WorkflowState {
                id: "mock-todo".into(),
                name: "Todo".into(),
                kind: "unstarted".into(),
            },
            WorkflowState {
                id: "mock-done".into(),
                name: "Done".into(),
                kind: "completed".into(),
            },
        ])
    }

    async fn fetch_current_user(&self) -> Result<TrackerUser, TrackerError> {
        Ok(TrackerUser {
            id: "mock-bot".into(),
            name: "Sylas Mock".into(),
            email: None,
        })
    }

    async fn create_agent_session_on_issue(
        &self,
        issue_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError> {
        let external_session_id = format!("mock-session-{issue_id}");
        self.inner
            .lock()
            .sessions
            .insert(external_session_id.clone(), issue_id.to_string());
        Ok(CreatedAgentSession { external_session_id })
    }

    async fn create_agent_session_on_comment(
        &self,
        issue_id: &str,
        comment_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError> {
        let external_session_id = format!("mock-session-{issue_id}-{comment_id}");
        self.inner
            .lock()
            .sessions
            .insert(external_session_id.clone(), issue_id.to_string());
        Ok(CreatedAgentSession { external_session_id })
    }

    async fn fetch_agent_session(
        &self,
        external_session_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError> {
        if self.inner.lock().sessions.contains_key(external_session_id) {
            Ok(CreatedAgentSession {
                external_session_id: external_session_id.to_string(),
            })
        } else {
            Err(TrackerError::OperationFailed {
                op: "fetch_agent_session",
                reason: format!("no such mock session: {external_session_id}"),
            })
        }
    }

    async fn create_agent_activity(&self, activity: CreateActivity<'_>) -> Result<(), TrackerError> {
        self.inner.lock().activities.push(MockActivity {
            external_session_id: activity.external_session_id.to_string(),
            kind: activity.kind,
            body: activity.body.to_string(),
        });
        Ok(())
    }

    async fn request_file_upload(&self, req: &UploadRequest) -> Result<UploadedAsset, TrackerError> {
        Ok(UploadedAsset {
            asset_url: format!("mock://uploads/{}", req.filename),
        })
    }

    async fn get_issue_labels(&self, issue_id: &str) -> Result<Vec<String>, TrackerError> {
        Ok(self.fetch_issue(issue_id).await?.labels)
    }

    fn kind(&self) -> &'static str {
        "cli-mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_create_then_activity_is_recorded() {
        let tracker = CliMockTracker::new();
        tracker.seed_issue(Issue {
            id: "iss-1".into(),
            identifier: "TEST-1".into(),
            title: "Add divide method".into(),
            description: String::new(),
            labels: vec![],
            assignee_id: None,
            team_id: None,
            state_id: None,
        });

        let created = tracker.create_agent_session_on_issue("iss-1").await.unwrap();
        tracker
            .create_agent_activity(CreateActivity {
                external_session_id: &created.external_session_id,
                kind: ActivityKind::Response,
                body: "done",
            })
            .await
            .unwrap();

        assert_eq!(tracker.activities().len(), 1);
        assert_eq!(tracker.activities()[0].body, "done");
    }

    #[tokio::test]
    async fn fetch_unknown_issue_is_operation_failed_not_panic() {
        let tracker = CliMockTracker::new();
        let err = tracker.fetch_issue("nope").await.unwrap_err();
        assert!(matches!(err, TrackerError::OperationFailed { .. }));
    }
}
