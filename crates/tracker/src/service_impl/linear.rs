// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Linear implementation of [`TrackerService`], talking to Linear's GraphQL
//! API. The 401 → singleflight-refresh → retry-once protocol lives in
//! [`LinearTracker::request`]; every trait method funnels through it.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use sylas_core::repository::TrackerCredential;

use crate::refresh::{OnTokenRefresh, RefreshCoordinator};
use crate::service::{
    ActivityKind, Attachment, CreateActivity, CreatedAgentSession, Issue, Team, TrackerError,
    TrackerService, TrackerUser, UploadRequest, UploadedAsset, WorkflowState, WorkspaceKey,
};

const GRAPHQL_URL: &str = "https://api.linear.app/graphql";

pub struct LinearTracker {
    client: Client,
    workspace_id: String,
    credential: RwLock<TrackerCredential>,
    refresh: Arc<RefreshCoordinator>,
    on_token_refresh: OnTokenRefresh,
    refresh_fn: Box<dyn Fn(&TrackerCredential) -> reqwest::RequestBuilder + Send + Sync>,
}

impl LinearTracker {
    pub fn new(
        client: Client,
        workspace_id: String,
        credential: TrackerCredential,
        refresh: Arc<RefreshCoordinator>,
        on_token_refresh: OnTokenRefresh,
        refresh_fn: Box<dyn Fn(&TrackerCredential) -> reqwest::RequestBuilder + Send + Sync>,
    ) -> Self {
        Self {
            client,
            workspace_id,
            credential: RwLock::new(credential),
            refresh,
            on_token_refresh,
            refresh_fn,
        }
    }

    fn current_token(&self) -> String {
        self.credential.read().access_token.clone()
    }

    /// Execute one GraphQL call, handling the 401 → refresh → retry-once
    /// dance. `op` names the logical operation for errors.
    async fn graphql(&self, op: &'static str, query: &str, vars: Value) -> Result<Value, TrackerError> {
        let body = self.graphql_once(op, query, &vars, self.current_token()).await;
        match body {
            Err(TrackerError::Unauthorized { .. }) => {
                let key = WorkspaceKey::new("linear", self.workspace_id.clone());
                let refresh_fn = &self.refresh_fn;
                let cred_before = self.credential.read().clone();
                let new_cred = self
                    .refresh
                    .refresh(
                        key,
                        || {
                            let req = refresh_fn(&cred_before);
                            Box::pin(async move {
                                let resp = req.send().await.map_err(|e| TrackerError::Transport {
                                    op: "refresh_token",
                                    source: e,
                                })?;
                                if !resp.status().is_success() {
                                    return Err(TrackerError::Http {
                                        op: "refresh_token",
                                        status: resp.status().as_u16(),
                                        body: resp.text().await.unwrap_or_default(),
                                    });
                                }
                                let json: Value =
                                    resp.json().await.map_err(|e| TrackerError::Transport {
                                        op: "refresh_token",
                                        source: e,
                                    })?;
                                Ok(TrackerCredential {
                                    repository_id: cred_before.repository_id.clone(),
                                    access_token: json
                                        .get("access_token")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default()
                                        .to_string(),
                                    refresh_token: json
                                        .get("refresh_token")
                                        .and_then(Value::as_str)
                                        .map(str::to_string),
                                    expires_at_epoch_ms: json
                                        .get("expires_at_epoch_ms")
                                        .and_then(Value::as_u64)
                                        .unwrap_or(0),
                                })
                            })
                        },
                        self.on_token_refresh.clone(),
                    )
                    .await?;
                *self.credential.write() = new_cred.clone();
                // Retry once, marked so a second 401 surfaces rather than looping.
                self.graphql_once(op, query, &vars, new_cred.access_token)
                    .await
                    .map_err(|e| match e {
                        TrackerError::Unauthorized { op } => {
                            TrackerError::Unauthorized { op }
                        }
                        other => other,
                    })
            }
            other => other,
        }
    }

    async fn graphql_once(
        &self,
        op: &'static str,
        query: &str,
        vars: &Value,
        token: String,
    ) -> Result<Value, TrackerError> {
        let resp = self
            .client
            .post(GRAPHQL_URL)
            .header("Authorization", token)
            .json(&json!({ "query": query, "variables": vars }))
            .send()
            .await
            .map_err(|e| TrackerError::Transport { op, source: e })?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(TrackerError::Unauthorized { op }),
            status if !status.is_success() => Err(TrackerError::Http {
                op,
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
            _ => {
                let body: Value = resp
                    .json()
                    .await
                    .map_err(|e| TrackerError::Transport { op, source: e })?;
                if let Some(errors) = body.get("errors").and_then(Value::as_array) {
                    if !errors.is_empty() {
                        return Err(TrackerError::OperationFailed {
                            op,
                            reason: errors.to_string(),
                        });
                    }
                }
                Ok(body)
            }
        }
    }
}

#[async_trait]
impl TrackerService for LinearTracker {
    async fn fetch_issue(&self, issue_id: &str) -> Result<Issue, TrackerError> {
        let body = self
            .graphql(
                "fetch_issue",
                "query($id: String!) { issue(id: $id) { id identifier title description \
                 labels { nodes { name } } assignee { id } team { id } state { id } } }",
                json!({ "id": issue_id }),
            )
            .await?;
        let data = body.get("data").and_then(|d| d.get("issue")).ok_or_else(|| {
            TrackerError::OperationFailed {
                op: "fetch_issue",
                reason: "missing data.issue".into(),
            }
        })?;
        parse_issue(data)
    }

    async fn fetch_issue_children(&self, issue_id: &str) -> Result<Vec<Issue>, TrackerError> {
        let body = self
            .graphql(
                "fetch_issue_children",
                "query($id: String!) { issue(id: $id) { children { nodes { id identifier \
                 title description } } } }",
                json!({ "id": issue_id }),
            )
            .await?;
        let nodes = body
            .pointer("/data/issue/children/nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        nodes.iter().map(parse_issue).collect()
    }

    async fn update_issue(&self, issue_id: &str, state_id: Option<&str>) -> Result<(), TrackerError> {
        self.graphql(
            "update_issue",
            "mutation($id: String!, $stateId: String) { issueUpdate(id: $id, input: \
             { stateId: $stateId }) { success } }",
            json!({ "id": issue_id, "stateId": state_id }),
        )
        .await?;
        Ok(())
    }

    async fn fetch_attachments(&self, issue_id: &str) -> Result<Vec<Attachment>, TrackerError> {
        let body = self
            .graphql(
                "fetch_attachments",
                "query($id: String!) { issue(id: $id) { attachments { nodes { id url title } } } }",
                json!({ "id": issue_id }),
            )
            .await?;
        let nodes = body
            .pointer("/data/issue/attachments/nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(nodes
            .iter()
            .filter_map(|n| {
                Some(Attachment {
                    id: n.get("id")?.as_str()?.to_string(),
                    url: n.get("url")?.as_str()?.to_string(),
                    title: n.get("title")?.as_str().unwrap_or("").to_string(),
                })
            })
            .collect())
    }

    async fn create_comment(&self, issue_id: &str, body: &str) -> Result<(), TrackerError> {
        let resp = self
            .graphql(
                "create_comment",
                "mutation($issueId: String!, $body: String!) { commentCreate(input: \
                 { issueId: $issueId, body: $body }) { success } }",
                json!({ "issueId": issue_id, "body": body }),
            )
            .await?;
        require_success(&resp, "create_comment", "commentCreate")
    }

    async fn fetch_teams(&self) -> Result<Vec<Team>, TrackerError> {
        let body = self
            .graphql(
                "fetch_teams",
                "query { teams { nodes { id name key } } }",
                json!({}),
            )
            .await?;
        let nodes = body
            .pointer("/data/teams/nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(nodes
            .iter()
            .filter_map(|n| {
                Some(Team {
                    id: n.get("id")?.as_str()?.to_string(),
                    name: n.get("name")?.as_str()?.to_string(),
                    key: n.get("key")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    async fn fetch_workflow_states(&self, team_id: &str) -> Result<Vec<WorkflowState>, TrackerError> {
        let body = self
            .graphql(
                "fetch_workflow_states",
                "query($teamId: String!) { team(id: $teamId) { states { nodes { id name type } } } }",
                json!({ "teamId": team_id }),
            )
            .await?;
        let nodes = body
            .pointer("/data/team/states/nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(nodes
            .iter()
            .filter_map(|n| {
                Some(WorkflowState {
                    id: n.get("id")?.as_str()?.to_string(),
                    name: n.get("name")?.as_str()?.to_string(),
                    kind: n.get("type")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    async fn fetch_current_user(&self) -> Result<TrackerUser, TrackerError> {
        let body = self
            .graphql("fetch_current_user", "query { viewer { id name email } }", json!({}))
            .await?;
        let v = body.pointer("/data/viewer").ok_or_else(|| TrackerError::OperationFailed {
            op: "fetch_current_user",
            reason: "missing data.viewer".into(),
        })?;
        Ok(TrackerUser {
            id: v.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            name: v.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            email: v.get("email").and_then(Value::as_str).map(str::to_string),
        })
    }

    async fn create_agent_session_on_issue(
        &self,
        issue_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError> {
        let body = self
            .graphql(
                "create_agent_session_on_issue",
                "mutation($issueId: String!) { agentSessionCreateOnIssue(issueId: $issueId) \
                 { success agentSession { id } } }",
                json!({ "issueId": issue_id }),
            )
            .await?;
        let id = body
            .pointer("/data/agentSessionCreateOnIssue/agentSession/id")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackerError::OperationFailed {
                op: "create_agent_session_on_issue",
                reason: "missing agentSession.id".into(),
            })?;
        Ok(CreatedAgentSession {
            external_session_id: id.to_string(),
        })
    }

    async fn create_agent_session_on_comment(
        &self,
        issue_id: &str,
        comment_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError> {
        let body = self
            .graphql(
                "create_agent_session_on_comment",
                "mutation($issueId: String!, $commentId: String!) { \
                 agentSessionCreateOnComment(issueId: $issueId, commentId: $commentId) \
                 { success agentSession { id } } }",
                json!({ "issueId": issue_id, "commentId": comment_id }),
            )
            .await?;
        let id = body
            .pointer("/data/agentSessionCreateOnComment/agentSession/id")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackerError::OperationFailed {
                op: "create_agent_session_on_comment",
                reason: "missing agentSession.id".into(),
            })?;
        Ok(CreatedAgentSession {
            external_session_id: id.to_string(),
        })
    }

    async fn fetch_agent_session(
        &self,
        external_session_id: &str,
    ) -> Result<CreatedAgentSession, TrackerError> {
        let body = self
            .graphql(
                "fetch_agent_session",
                "query($id: String!) { agentSession(id: $id) { id } }",
                json!({ "id": external_session_id }),
            )
            .await?;
        let id = body
            .pointer("/data/agentSession/id")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackerError::OperationFailed {
                op: "fetch_agent_session",
                reason: "missing agentSession.id".into(),
            })?;
        Ok(CreatedAgentSession {
            external_session_id: id.to_string(),
        })
    }

    async fn create_agent_activity(
        &self,
        activity: CreateActivity<'_>,
    ) -> Result<(), TrackerError> {
        let type_name = match activity.kind {
            ActivityKind::Thought => "thought",
            ActivityKind::Action => "action",
            ActivityKind::Response => "response",
            ActivityKind::ProcedureSelection => "elicitation",
            ActivityKind::Analyzing => "thought",
        };
        let resp = self
            .graphql(
                "create_agent_activity",
                "mutation($sessionId: String!, $type: String!, $body: String!) { \
                 agentActivityCreate(input: { agentSessionId: $sessionId, content: \
                 { type: $type, body: $body } }) { success } }",
                json!({
                    "sessionId": activity.external_session_id,
                    "type": type_name,
                    "body": activity.body,
                }),
            )
            .await?;
        require_success(&resp, "create_agent_activity", "agentActivityCreate")
    }

    async fn request_file_upload(&self, req: &UploadRequest) -> Result<UploadedAsset, TrackerError> {
        let body = self
            .graphql(
                "request_file_upload",
                "mutation($filename: String!, $contentType: String!, $size: Int!) { \
                 fileUpload(filename: $filename, contentType: $contentType, size: $size) \
                 { success uploadFile { uploadUrl assetUrl headers { key value } } } }",
                json!({
                    "filename": req.filename,
                    "contentType": req.content_type,
                    "size": req.bytes.len() as i64,
                }),
            )
            .await?;
        let upload_url = body
            .pointer("/data/fileUpload/uploadFile/uploadUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackerError::OperationFailed {
                op: "request_file_upload",
                reason: "missing uploadUrl".into(),
            })?;
        let asset_url = body
            .pointer("/data/fileUpload/uploadFile/assetUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackerError::OperationFailed {
                op: "request_file_upload",
                reason: "missing assetUrl".into(),
            })?
            .to_string();

        let mut put = self.client.put(upload_url).body(req.bytes.clone());
        if let Some(headers) = body
            .pointer("/data/fileUpload/uploadFile/headers")
            .and_then(Value::as_array)
        {
            for h in headers {
                if let (Some(k), Some(v)) = (
                    h.get("key").and_then(Value::as_str),
                    h.get("value").and_then(Value::as_str),
                ) {
                    put = put.header(k, v);
                }
            }
        }
        let put_resp = put
            .send()
            .await
            .map_err(|e| TrackerError::Transport {
                op: "request_file_upload",
                source: e,
            })?;
        if !put_resp.status().is_success() {
            return Err(TrackerError::Http {
                op: "request_file_upload",
                status: put_resp.status().as_u16(),
                body: put_resp.text().await.unwrap_or_default(),
            });
        }

        Ok(UploadedAsset { asset_url })
    }

    async fn get_issue_labels(&self, issue_id: &str) -> Result<Vec<String>, TrackerError> {
        Ok(self.fetch_issue(issue_id).await?.labels)
    }

    fn kind(&self) -> &'static str {
        "linear"
    }
}

fn parse_issue(v: &Value) -> Result<Issue, TrackerError> {
    Ok(Issue {
        id: v
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackerError::OperationFailed {
                op: "fetch_issue",
                reason: "missing id".into(),
            })?
            .to_string(),
        identifier: v.get("identifier").and_then(Value::as_str).unwrap_or("").to_string(),
        title: v.get("title").and_then(Value::as_str).unwrap_or("").to_string(),
        description: v.get("description").and_then(Value::as_str).unwrap_or("").to_string(),
        labels: v
            .pointer("/labels/nodes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|n| n.get("name")?.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        assignee_id: v.pointer("/assignee/id").and_then(Value::as_str).map(str::to_string),
        team_id: v.pointer("/team/id").and_then(Value::as_str).map(str::to_string),
        state_id: v.pointer("/state/id").and_then(Value::as_str).map(str::to_string),
    })
}

fn require_success(body: &Value, op: &'static str, mutation: &str) -> Result<(), TrackerError> {
    let success = body
        .pointer(&format!("/data/{mutation}/success"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if success {
        Ok(())
    } else {
        Err(TrackerError::OperationFailed {
            op,
            reason: format!("{mutation} returned success=false"),
        })
    }
}
