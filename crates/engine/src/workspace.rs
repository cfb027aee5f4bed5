// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workspace factory: the one place the engine crosses from "what
//! directory does this session live in" into actual filesystem/git work.
//!
//! Per the ingress/session-manager boundary, workspace creation is
//! deliberately left as an external collaborator rather than engine-owned
//! git plumbing: [`WorkspaceFactory`] is a trait so a deployment can swap in
//! real `git worktree add` behaviour (cutting a branch from
//! `Repository::base_branch` under `Repository::workspace_base`) without the
//! session lifecycle manager caring. [`LocalWorkspaceFactory`] is the
//! directory-only implementation used by the CLI-mock tracker and the test
//! suite.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace directory: {0}")]
    Create(#[from] std::io::Error),
    #[error("git worktree setup failed: {0}")]
    Git(String),
}

/// Creates and tears down the directory a session's runner is spawned in.
#[async_trait]
pub trait WorkspaceFactory: Send + Sync {
    /// Prepare `path` as a ready-to-use workspace. `repo_root`, `branch`,
    /// and `start_point` are only meaningful to a git-backed implementation;
    /// a plain-directory factory ignores them.
    async fn create(
        &self,
        path: &Path,
        repo_root: Option<&Path>,
        branch: Option<&str>,
        start_point: Option<&str>,
    ) -> Result<(), WorkspaceError>;

    async fn delete(&self, path: &Path) -> Result<(), WorkspaceError>;
}

/// Plain-directory workspace factory: `mkdir -p` on create, `rm -rf` on
/// delete. No git worktree registration — used by the CLI-mock tracker and
/// integration tests, where the "repository" is just a scratch directory.
#[derive(Debug, Clone, Default)]
pub struct LocalWorkspaceFactory;

#[async_trait]
impl WorkspaceFactory for LocalWorkspaceFactory {
    async fn create(
        &self,
        path: &Path,
        _repo_root: Option<&Path>,
        _branch: Option<&str>,
        _start_point: Option<&str>,
    ) -> Result<(), WorkspaceError> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), WorkspaceError> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(path).await?;
        }
        Ok(())
    }
}

/// Git-worktree-backed workspace factory: cuts a new worktree from
/// `repo_root` at `start_point` (falling back to `branch`, then `HEAD`).
/// This is the production implementation a deployment wires in when
/// repositories are real git checkouts rather than scratch directories.
#[derive(Debug, Clone, Default)]
pub struct GitWorktreeFactory;

#[async_trait]
impl WorkspaceFactory for GitWorktreeFactory {
    async fn create(
        &self,
        path: &Path,
        repo_root: Option<&Path>,
        branch: Option<&str>,
        start_point: Option<&str>,
    ) -> Result<(), WorkspaceError> {
        let Some(repo_root) = repo_root else {
            return Err(WorkspaceError::Git("no repo_root given for worktree".into()));
        };
        let reference = start_point.or(branch).unwrap_or("HEAD");

        let output = tokio::process::Command::new("git")
            .arg("worktree")
            .arg("add")
            .arg("--detach")
            .arg(path)
            .arg(reference)
            .current_dir(repo_root)
            .output()
            .await?;

        if !output.status.success() {
            return Err(WorkspaceError::Git(String::from_utf8_lossy(&output.stderr).into_owned()));
        }

        if let Some(branch) = branch {
            let _ = tokio::process::Command::new("git")
                .arg("checkout")
                .arg("-B")
                .arg(branch)
                .current_dir(path)
                .output()
                .await;
        }
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), WorkspaceError> {
        let dot_git = path.join(".git");
        if tokio::fs::symlink_metadata(&dot_git)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            let _ = tokio::process::Command::new("git")
                .arg("worktree")
                .arg("remove")
                .arg("--force")
                .arg(path)
                .output()
                .await;
        }
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(path).await?;
        }
        Ok(())
    }
}

/// Where a new session's workspace directory lives, given a repository's
/// configured base and the session's own id.
pub fn workspace_path(workspace_base: Option<&Path>, repo_path: &Path, session_id: &str) -> PathBuf {
    workspace_base
        .unwrap_or(repo_path)
        .join("sylas-sessions")
        .join(session_id)
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
