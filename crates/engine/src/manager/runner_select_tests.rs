// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;
use sylas_core::{RepositoryId, TrackerKind, WebhookAuthMode};
use sylas_runners::FakeRunnerAdapter;

fn repo() -> Repository {
    Repository {
        id: RepositoryId::new("repo-1"),
        name: "widgets".into(),
        tracker_project_id: "proj-1".into(),
        tracker_kind: TrackerKind::CliMock,
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

fn runners(kinds: &[&str]) -> HashMap<String, Arc<dyn RunnerAdapter>> {
    kinds
        .iter()
        .map(|k| (k.to_string(), Arc::new(FakeRunnerAdapter::new()) as Arc<dyn RunnerAdapter>))
        .collect()
}

#[test]
fn agent_tag_in_description_wins_over_everything() {
    let runners = runners(&["claude", "gemini"]);
    let kind = select_runner_kind(&repo(), &["gemini".to_string()], "Please [agent=claude] fix this", &runners);
    assert_eq!(kind, "claude");
}

#[test]
fn unrecognised_agent_tag_is_skipped() {
    let runners = runners(&["claude"]);
    let kind = select_runner_kind(&repo(), &[], "[agent=cursor] do the thing", &runners);
    assert_eq!(kind, "claude");
}

#[test]
fn model_tag_in_description_maps_to_runner_kind() {
    let runners = runners(&["claude", "codex"]);
    let kind = select_runner_kind(&repo(), &[], "[model=gpt-5-codex] fix the bug", &runners);
    assert_eq!(kind, "codex");
}

#[test]
fn agent_tag_beats_model_tag() {
    let runners = runners(&["claude", "codex"]);
    let kind = select_runner_kind(&repo(), &[], "[model=gpt-5-codex] [agent=claude] go", &runners);
    assert_eq!(kind, "claude");
}

#[test]
fn known_agent_label_is_used_when_no_tag_present() {
    let runners = runners(&["claude", "gemini"]);
    let kind = select_runner_kind(&repo(), &["gemini".to_string()], "plain text, no tags", &runners);
    assert_eq!(kind, "gemini");
}

#[test]
fn known_model_label_maps_to_runner_kind() {
    let runners = runners(&["claude", "codex"]);
    let kind = select_runner_kind(&repo(), &["opus".to_string()], "plain text", &runners);
    // "opus" doesn't contain any of the recognised model substrings, so it
    // falls through to the repository/claude default rather than matching.
    assert_eq!(kind, "claude");
}

#[test]
fn known_model_label_gpt_maps_to_codex() {
    let runners = runners(&["claude", "codex"]);
    let kind = select_runner_kind(&repo(), &["gpt-5".to_string()], "plain text", &runners);
    assert_eq!(kind, "codex");
}

#[test]
fn defaults_to_claude_when_nothing_else_applies() {
    let runners = runners(&["claude", "gemini"]);
    let kind = select_runner_kind(&repo(), &[], "", &runners);
    assert_eq!(kind, "claude");
}

#[test]
fn disallow_all_tools_spec_forces_empty_allowed_list() {
    let spec = SubroutineSpec {
        disallow_all_tools: true,
        ..Default::default()
    };
    let config = build_runner_config(&repo(), &spec);
    assert_eq!(config.get("allowed_tools"), Some(&serde_json::json!([])));
}

#[test]
fn repository_allowed_tools_pass_through_by_default() {
    let mut repo = repo();
    repo.allowed_tools = vec!["bash".to_string()];
    let config = build_runner_config(&repo, &SubroutineSpec::default());
    assert_eq!(config.get("allowed_tools"), Some(&serde_json::json!(["bash"])));
}
