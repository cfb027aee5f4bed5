// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the collaborators [`sylas_engine::ManagerDeps`] needs from a
//! loaded [`FileConfig`]: repositories, tracker services, runner adapters,
//! the workspace factory, and ingress routes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use sylas_core::repository::TrackerCredential;
use sylas_core::{Repository, RepositoryId, TrackerKind, WebhookAuthMode};
use sylas_engine::{GitWorktreeFactory, WorkspaceFactory};
use sylas_runners::{
    ClaudeRunnerAdapter, CodexRunnerAdapter, CursorRunnerAdapter, GeminiRunnerAdapter,
    OpenCodeRunnerAdapter, RunnerAdapter,
};
use sylas_tracker::{
    CliMockTracker, LinearTracker, RefreshCoordinator, RepoRoute, SlackMirrorTracker,
    TrackerService, VerificationMode,
};

use crate::config::{EnvConfig, FileConfig};

pub fn build_repositories(config: &FileConfig) -> HashMap<RepositoryId, Repository> {
    config
        .repositories
        .iter()
        .map(|r| (RepositoryId::new(r.id.clone()), r.to_repository()))
        .collect()
}

pub fn build_routes(config: &FileConfig) -> Vec<RepoRoute> {
    config
        .repositories
        .iter()
        .filter_map(|r| {
            let verification = match r.webhook_auth_mode {
                WebhookAuthMode::Direct => VerificationMode::Direct {
                    secret: r.webhook_secret.clone()?,
                },
                WebhookAuthMode::Proxy => VerificationMode::Proxy {
                    token: r.proxy_token.clone()?,
                },
            };
            Some(RepoRoute {
                repository_id: RepositoryId::new(r.id.clone()),
                organization_id: r.organization_id.clone(),
                verification,
            })
        })
        .collect()
}

pub fn slack_verification(env: &EnvConfig) -> Option<VerificationMode> {
    env.cloudflare_token
        .clone()
        .map(|token| VerificationMode::Proxy { token })
}

/// One tracker service per configured repository, persisting refreshed
/// Linear credentials back into `config.json` as they come in. Refresh
/// failures are logged, never fatal.
pub fn build_trackers(
    config: &FileConfig,
    http_client: &Client,
    refresh: &Arc<RefreshCoordinator>,
    config_path: PathBuf,
) -> HashMap<RepositoryId, Arc<dyn TrackerService>> {
    let mut trackers: HashMap<RepositoryId, Arc<dyn TrackerService>> = HashMap::new();
    for repo_cfg in &config.repositories {
        let repository_id = RepositoryId::new(repo_cfg.id.clone());
        let tracker: Arc<dyn TrackerService> = match repo_cfg.tracker_kind {
            TrackerKind::Linear => {
                let Some(credential) = repo_cfg.to_credential() else {
                    tracing::warn!(repository = %repository_id, "linear repository has no credentials, skipping");
                    continue;
                };
                let config_path = config_path.clone();
                let repo_id_for_persist = repo_cfg.id.clone();
                let on_token_refresh: sylas_tracker::refresh::OnTokenRefresh =
                    Arc::new(move |cred: TrackerCredential| {
                        if let Err(err) = persist_refreshed_credential(&config_path, &repo_id_for_persist, &cred) {
                            tracing::warn!(error = %err, "failed to persist refreshed linear credentials");
                        }
                    });
                Arc::new(LinearTracker::new(
                    http_client.clone(),
                    repo_cfg.organization_id.clone(),
                    credential,
                    refresh.clone(),
                    on_token_refresh,
                    Box::new(linear_refresh_request),
                ))
            }
            TrackerKind::Slack => {
                let Some(credential) = repo_cfg.to_credential() else {
                    tracing::warn!(repository = %repository_id, "slack repository has no bot token, skipping");
                    continue;
                };
                Arc::new(SlackMirrorTracker::new(http_client.clone(), credential.access_token))
            }
            TrackerKind::CliMock => Arc::new(CliMockTracker::new()),
        };
        trackers.insert(repository_id, tracker);
    }
    trackers
}

fn linear_refresh_request(cred: &TrackerCredential) -> reqwest::RequestBuilder {
    let client = Client::new();
    client
        .post("https://api.linear.app/oauth/token")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", cred.refresh_token.as_deref().unwrap_or("")),
        ])
}

fn persist_refreshed_credential(
    config_path: &std::path::Path,
    repository_id: &str,
    cred: &TrackerCredential,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(config_path)?;
    let mut value: serde_json::Value = serde_json::from_str(&raw)?;
    let repos = value
        .get_mut("repositories")
        .and_then(|v| v.as_array_mut())
        .ok_or_else(|| anyhow::anyhow!("config.json missing repositories array"))?;
    let entry = repos
        .iter_mut()
        .find(|r| r.get("id").and_then(|v| v.as_str()) == Some(repository_id))
        .ok_or_else(|| anyhow::anyhow!("repository {repository_id} not found in config.json"))?;
    entry["credentials"] = serde_json::json!({
        "accessToken": cred.access_token,
        "refreshToken": cred.refresh_token,
        "expiresAtEpochMs": cred.expires_at_epoch_ms,
    });
    let tmp_path = config_path.with_extension("json.tmp");
    std::fs::write(&tmp_path, serde_json::to_string_pretty(&value)?)?;
    std::fs::rename(&tmp_path, config_path)?;
    Ok(())
}

pub fn build_runners() -> HashMap<String, Arc<dyn RunnerAdapter>> {
    let mut runners: HashMap<String, Arc<dyn RunnerAdapter>> = HashMap::new();
    runners.insert("claude".to_string(), Arc::new(ClaudeRunnerAdapter::new()));
    runners.insert("gemini".to_string(), Arc::new(GeminiRunnerAdapter::new()));
    runners.insert("codex".to_string(), Arc::new(CodexRunnerAdapter::new()));
    runners.insert("cursor".to_string(), Arc::new(CursorRunnerAdapter::new()));
    runners.insert("opencode".to_string(), Arc::new(OpenCodeRunnerAdapter::new()));
    runners
}

pub fn workspace_factory() -> Arc<dyn WorkspaceFactory> {
    Arc::new(GitWorktreeFactory)
}
