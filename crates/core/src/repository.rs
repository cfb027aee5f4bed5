// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository configuration: the unit `config.json` arrays over.
//!
//! A [`Repository`] binds one tracker project/workspace to one checked-out
//! git repo and the runner defaults used for sessions created under it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a configured repository.
    pub struct RepositoryId;
}

/// Which issue tracker a repository's sessions are driven from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    Linear,
    Slack,
    /// Local CLI-driven mock tracker, used for demos and integration tests.
    CliMock,
}

/// How inbound webhooks for a repository are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAuthMode {
    /// Tracker calls Sylas directly; body is HMAC-SHA256 signed with a
    /// shared secret (Linear's `Linear-Signature` header convention).
    Direct,
    /// A trusted proxy (e.g. Cloudflare Tunnel) forwards the request with a
    /// bearer token Sylas compares in constant time.
    Proxy,
}

/// A single configured repository, as loaded from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    /// Human-readable name shown in activity and logs.
    pub name: String,
    /// Tracker-side project/workspace id this repository's sessions belong to.
    pub tracker_project_id: String,
    pub tracker_kind: TrackerKind,
    /// Local checkout this repository's workspaces are derived from.
    pub repo_path: PathBuf,
    /// Branch new workspaces are cut from when no `start_point` is given.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Directory new per-issue workspaces (worktrees) are created under.
    #[serde(default)]
    pub workspace_base: Option<PathBuf>,
    /// Whether this repository currently accepts new sessions. A disabled
    /// repository still resolves for routing (so its webhooks 200-ack) but
    /// the lifecycle manager refuses to create sessions under it.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Procedure kind new sessions default to when the tracker doesn't
    /// specify one (e.g. via a label or slash command).
    pub default_procedure: String,
    pub webhook_auth_mode: WebhookAuthMode,
    /// Tools the runner is allowed to use, if the tracker doesn't override.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    /// Default model for the Claude runner, if not set per-session.
    #[serde(default)]
    pub claude_default_model: Option<String>,
    /// Fallback model for the Claude runner if the default is unavailable.
    #[serde(default)]
    pub claude_default_fallback_model: Option<String>,
    #[serde(default)]
    pub gemini_default_model: Option<String>,
    #[serde(default)]
    pub codex_default_model: Option<String>,
    /// Case-insensitive label -> procedure-name override, checked before AI
    /// classification.
    #[serde(default)]
    pub label_prompts: HashMap<String, String>,
    /// Allow/deny list of tracker user ids permitted to drive sessions on
    /// this repository. Empty means unrestricted.
    #[serde(default)]
    pub user_access_control: Vec<String>,
    /// Additional per-repository environment passed to every runner.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

impl Repository {
    /// Resolve label→procedure overrides: a configured `label_prompts`
    /// entry wins, matched case-insensitively; failing that, the built-in
    /// `orchestrator` label always forces `orchestrator-full` even when no
    /// config entry names it.
    pub fn procedure_for_labels(&self, labels: &[String]) -> Option<String> {
        for label in labels {
            let lowered = label.to_lowercase();
            if let Some((_, procedure)) = self
                .label_prompts
                .iter()
                .find(|(k, _)| k.to_lowercase() == lowered)
            {
                return Some(procedure.clone());
            }
        }
        if labels.iter().any(|l| l.eq_ignore_ascii_case("orchestrator")) {
            return Some("orchestrator-full".to_string());
        }
        None
    }

    /// Whether `tracker_user_id` may drive sessions on this repository.
    /// An empty `user_access_control` list means unrestricted.
    pub fn user_is_allowed(&self, tracker_user_id: &str) -> bool {
        self.user_access_control.is_empty()
            || self
                .user_access_control
                .iter()
                .any(|id| id == tracker_user_id)
    }
}

/// A stored OAuth credential for a repository's tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerCredential {
    pub repository_id: RepositoryId,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at_epoch_ms: u64,
}

impl TrackerCredential {
    /// Whether this credential needs a refresh before use.
    ///
    /// A small safety margin avoids a refresh racing a request that was
    /// issued while the token was still (barely) valid.
    pub fn needs_refresh(&self, now_epoch_ms: u64) -> bool {
        const REFRESH_MARGIN_MS: u64 = 60_000;
        now_epoch_ms + REFRESH_MARGIN_MS >= self.expires_at_epoch_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_refresh_true_within_margin() {
        let cred = TrackerCredential {
            repository_id: RepositoryId::new("repo-1"),
            access_token: "tok".into(),
            refresh_token: None,
            expires_at_epoch_ms: 100_000,
        };
        assert!(cred.needs_refresh(99_000));
        assert!(!cred.needs_refresh(10_000));
    }

    #[test]
    fn repository_round_trips_through_json() {
        let repo = Repository {
            id: RepositoryId::new("repo-1"),
            name: "widgets".into(),
            tracker_project_id: "proj-1".into(),
            tracker_kind: TrackerKind::Linear,
            repo_path: PathBuf::from("/srv/widgets"),
            base_branch: "main".into(),
            workspace_base: None,
            active: true,
            default_procedure: "bugfix".into(),
            webhook_auth_mode: WebhookAuthMode::Direct,
            allowed_tools: vec!["bash".into()],
            disallowed_tools: vec![],
            claude_default_model: Some("claude-sonnet".into()),
            claude_default_fallback_model: None,
            gemini_default_model: None,
            codex_default_model: None,
            label_prompts: HashMap::new(),
            user_access_control: vec![],
            env: HashMap::new(),
        };
        let json = serde_json::to_string(&repo).unwrap();
        let parsed: Repository = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tracker_kind, TrackerKind::Linear);
        assert_eq!(parsed.webhook_auth_mode, WebhookAuthMode::Direct);
    }

    #[test]
    fn orchestrator_label_is_built_in_case_insensitive() {
        let repo = sample_repo();
        assert_eq!(
            repo.procedure_for_labels(&["Orchestrator".to_string()]),
            Some("orchestrator-full".to_string())
        );
    }

    #[test]
    fn configured_label_prompt_wins_over_built_in() {
        let mut repo = sample_repo();
        repo.label_prompts
            .insert("bug".to_string(), "debugger-full".to_string());
        assert_eq!(
            repo.procedure_for_labels(&["Bug".to_string()]),
            Some("debugger-full".to_string())
        );
    }

    #[test]
    fn empty_user_access_control_allows_everyone() {
        let repo = sample_repo();
        assert!(repo.user_is_allowed("anyone"));
    }

    fn sample_repo() -> Repository {
        Repository {
            id: RepositoryId::new("repo-1"),
            name: "widgets".into(),
            tracker_project_id: "proj-1".into(),
            tracker_kind: TrackerKind::Linear,
            repo_path: PathBuf::from("/srv/widgets"),
            base_branch: "main".into(),
            workspace_base: None,
            active: true,
            default_procedure: "full-development".into(),
            webhook_auth_mode: WebhookAuthMode::Direct,
            allowed_tools: vec![],
            disallowed_tools: vec![],
            claude_default_model: None,
            claude_default_fallback_model: None,
            gemini_default_model: None,
            codex_default_model: None,
            label_prompts: HashMap::new(),
            user_access_control: vec![],
            env: HashMap::new(),
        }
    }
}
