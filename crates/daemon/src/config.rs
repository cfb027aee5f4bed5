// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `config.json` loading and environment-variable overrides.
//!
//! `config.json` is the only on-disk configuration surface; everything else
//! recognised by the daemon is an environment variable read once at
//! startup. Both are read once, at process start; adding or disabling a
//! repository requires a restart (see DESIGN.md for why hot-reload was
//! deferred rather than half-built against the manager's fixed repository
//! map).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sylas_core::repository::TrackerCredential;
use sylas_core::{Repository, RepositoryId, TrackerKind, WebhookAuthMode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

/// One repository entry as written in `config.json`. Converted to
/// [`sylas_core::Repository`] plus the ingress/credential bits the core
/// type doesn't carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    pub id: String,
    pub name: String,
    /// Local checkout path new worktrees are derived from.
    pub path: PathBuf,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_procedure")]
    pub default_procedure: String,
    #[serde(default = "default_tracker_kind")]
    pub tracker_kind: TrackerKind,
    /// Linear workspace id / Slack team id the webhook's organization id is
    /// matched against for routing.
    pub organization_id: String,
    #[serde(default = "default_auth_mode")]
    pub webhook_auth_mode: WebhookAuthMode,
    /// HMAC shared secret, required when `webhook_auth_mode` is `direct`.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Bearer token, required when `webhook_auth_mode` is `proxy`.
    #[serde(default)]
    pub proxy_token: Option<String>,
    #[serde(default)]
    pub credentials: Option<CredentialConfig>,
    #[serde(default)]
    pub label_prompts: HashMap<String, String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    #[serde(default)]
    pub claude_default_model: Option<String>,
    #[serde(default)]
    pub claude_default_fallback_model: Option<String>,
    #[serde(default)]
    pub gemini_default_model: Option<String>,
    #[serde(default)]
    pub codex_default_model: Option<String>,
    #[serde(default)]
    pub user_access_control: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialConfig {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at_epoch_ms: u64,
}

impl RepositoryConfig {
    pub fn to_repository(&self) -> Repository {
        Repository {
            id: RepositoryId::new(self.id.clone()),
            name: self.name.clone(),
            tracker_project_id: self.organization_id.clone(),
            tracker_kind: self.tracker_kind,
            repo_path: self.path.clone(),
            base_branch: self.base_branch.clone(),
            workspace_base: self.workspace_dir.clone(),
            active: self.active,
            default_procedure: self.default_procedure.clone(),
            webhook_auth_mode: self.webhook_auth_mode,
            allowed_tools: self.allowed_tools.clone(),
            disallowed_tools: self.disallowed_tools.clone(),
            claude_default_model: self.claude_default_model.clone(),
            claude_default_fallback_model: self.claude_default_fallback_model.clone(),
            gemini_default_model: self.gemini_default_model.clone(),
            codex_default_model: self.codex_default_model.clone(),
            label_prompts: self.label_prompts.clone(),
            user_access_control: self.user_access_control.clone(),
            env: self.env.clone(),
        }
    }

    pub fn to_credential(&self) -> Option<TrackerCredential> {
        let cred = self.credentials.as_ref()?;
        Some(TrackerCredential {
            repository_id: RepositoryId::new(self.id.clone()),
            access_token: cred.access_token.clone(),
            refresh_token: cred.refresh_token.clone(),
            expires_at_epoch_ms: cred.expires_at_epoch_ms,
        })
    }
}

/// Root shape of `config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub claude_default_model: Option<String>,
    #[serde(default)]
    pub claude_default_fallback_model: Option<String>,
    #[serde(default)]
    pub gemini_default_model: Option<String>,
    #[serde(default)]
    pub codex_default_model: Option<String>,
    #[serde(default)]
    pub global_setup_script: Option<String>,
    #[serde(default)]
    pub user_access_control: Vec<String>,
    /// Runner kind used for one-shot classification calls. Not a required
    /// config key; a reasonable ambient default ("claude") is used when
    /// absent.
    #[serde(default = "default_classifier_runner")]
    pub classifier_runner: String,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

fn default_procedure() -> String {
    "full-development".to_string()
}

fn default_tracker_kind() -> TrackerKind {
    TrackerKind::Linear
}

fn default_auth_mode() -> WebhookAuthMode {
    WebhookAuthMode::Direct
}

fn default_classifier_runner() -> String {
    "claude".to_string()
}

/// Environment variables recognised by the daemon, read once at startup.
/// `config.json` governs per-repository shape; these govern the process as
/// a whole.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub server_port: u16,
    pub host_external: bool,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub allowed_tools_override: Option<Vec<String>>,
    pub disallowed_tools_override: Option<Vec<String>>,
    pub claude_default_model: Option<String>,
    pub gemini_default_model: Option<String>,
    pub codex_default_model: Option<String>,
    pub cloudflare_token: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            server_port: std::env::var("SYLAS_SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            host_external: std::env::var("SYLAS_HOST_EXTERNAL")
                .map(|v| v == "true")
                .unwrap_or(false),
            base_url: std::env::var("SYLAS_BASE_URL").ok(),
            api_key: std::env::var("SYLAS_API_KEY").ok(),
            allowed_tools_override: csv_env("ALLOWED_TOOLS"),
            disallowed_tools_override: csv_env("DISALLOWED_TOOLS"),
            claude_default_model: std::env::var("SYLAS_CLAUDE_DEFAULT_MODEL").ok(),
            gemini_default_model: std::env::var("SYLAS_GEMINI_DEFAULT_MODEL").ok(),
            codex_default_model: std::env::var("SYLAS_CODEX_DEFAULT_MODEL").ok(),
            cloudflare_token: std::env::var("CLOUDFLARE_TOKEN").ok(),
        }
    }

    pub fn bind_host(&self) -> &'static str {
        if self.host_external {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

fn csv_env(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

/// `$SYLAS_HOME`, or `~/.sylas` when unset — the root every daemon-owned
/// path (config, state, logs) is resolved under.
pub fn sylas_home() -> PathBuf {
    if let Ok(dir) = std::env::var("SYLAS_HOME") {
        return PathBuf::from(dir);
    }
    dirs_home().join(".sylas")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let json = r#"{
            "repositories": [{
                "id": "repo-1",
                "name": "widgets",
                "path": "/srv/widgets",
                "organizationId": "org-1",
                "webhookAuthMode": "proxy",
                "proxyToken": "secret"
            }]
        }"#;
        let cfg: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.repositories.len(), 1);
        let repo = cfg.repositories[0].to_repository();
        assert_eq!(repo.id.to_string(), "repo-1");
        assert_eq!(repo.base_branch, "main");
        assert!(repo.active);
    }

    #[test]
    fn missing_credentials_is_none() {
        let repo_cfg = RepositoryConfig {
            id: "r".into(),
            name: "r".into(),
            path: PathBuf::from("/tmp/r"),
            base_branch: "main".into(),
            workspace_dir: None,
            active: true,
            default_procedure: "full-development".into(),
            tracker_kind: TrackerKind::Linear,
            organization_id: "org".into(),
            webhook_auth_mode: WebhookAuthMode::Direct,
            webhook_secret: Some("shh".into()),
            proxy_token: None,
            credentials: None,
            label_prompts: HashMap::new(),
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            claude_default_model: None,
            claude_default_fallback_model: None,
            gemini_default_model: None,
            codex_default_model: None,
            user_access_control: Vec::new(),
            env: HashMap::new(),
        };
        assert!(repo_cfg.to_credential().is_none());
    }

    #[test]
    fn csv_env_splits_and_trims() {
        std::env::set_var("SYLAS_TEST_TOOLS", "Bash, Read ,Write");
        let parsed = csv_env("SYLAS_TEST_TOOLS").unwrap();
        assert_eq!(parsed, vec!["Bash", "Read", "Write"]);
        std::env::remove_var("SYLAS_TEST_TOOLS");
    }
}
