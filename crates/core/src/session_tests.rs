// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn config() -> SessionConfig {
    SessionConfig {
        id: "sess-1".into(),
        external_session_id: "LIN-123".into(),
        repository_id: "repo-1".into(),
        procedure_kind: "bugfix".into(),
        vars: HashMap::new(),
        procedure_hash: "hash-1".into(),
        cwd: PathBuf::from("/tmp/repo"),
        initial_subroutine: "triage".into(),
        labels: vec![],
    }
}

#[test]
fn new_session_seeds_current_with_initial_subroutine() {
    let session = Session::new(config(), 1_000);
    assert_eq!(session.subroutine, "triage");
    assert!(session.history.is_empty());
    assert_eq!(session.current.name, "triage");
    assert_eq!(session.current.started_at_ms, 1_000);
    assert_eq!(session.current.outcome, SubroutineOutcome::Running);
}

#[test]
fn new_session_retains_the_labels_snapshot() {
    let mut cfg = config();
    cfg.labels = vec!["orchestrator".to_string(), "bug".to_string()];
    let session = Session::new(cfg, 1_000);
    assert_eq!(session.labels, vec!["orchestrator".to_string(), "bug".to_string()]);
}

#[test]
fn labels_default_to_empty_when_absent_from_json() {
    // Snapshots written before the labels field existed must still
    // deserialize: `#[serde(default)]` keeps old state.json files loadable.
    let json = serde_json::json!({
        "id": "sess-1",
        "external_session_id": "LIN-123",
        "repository_id": "repo-1",
        "procedure_kind": "bugfix",
        "subroutine": "triage",
        "subroutine_status": "Pending",
        "vars": {},
        "procedure_hash": "hash-1",
        "cwd": "/tmp/repo",
        "total_retries": 0,
    });
    let session: Session = serde_json::from_value(json).expect("old-shaped session should still parse");
    assert!(session.labels.is_empty());
}

#[test]
fn finalize_current_subroutine_sets_finished_at_once() {
    let mut session = Session::new(config(), 0);
    session.finalize_current_subroutine(SubroutineOutcome::Completed, 500);
    session.finalize_current_subroutine(SubroutineOutcome::Failed("late".into()), 999);
    assert_eq!(session.current.finished_at_ms, Some(500));
    assert_eq!(session.current.outcome, SubroutineOutcome::Completed);
}

#[test]
fn push_subroutine_moves_current_into_history_and_starts_a_fresh_one() {
    let mut session = Session::new(config(), 0);
    session.finalize_current_subroutine(SubroutineOutcome::Completed, 10);
    session.push_subroutine("implement", 20);
    assert_eq!(session.history.len(), 1);
    assert_eq!(session.history[0].name, "triage");
    assert_eq!(session.history[0].outcome, SubroutineOutcome::Completed);
    assert_eq!(session.current.name, "implement");
    assert_eq!(session.current.outcome, SubroutineOutcome::Running);
    assert_eq!(session.current.finished_at_ms, None);
}

#[test]
fn is_terminal_tracks_session_status() {
    let mut session = Session::new(config(), 0);
    assert!(!session.is_terminal());
    session.status = SessionStatus::Ended;
    assert!(session.is_terminal());
}

#[test]
fn increment_action_attempt_tracks_cumulative_retries() {
    let mut session = Session::new(config(), 0);
    assert_eq!(session.increment_action_attempt("on_fail", 0), 1);
    assert_eq!(session.total_retries, 0);
    assert_eq!(session.increment_action_attempt("on_fail", 0), 2);
    assert_eq!(session.total_retries, 1);
}

#[test]
fn validation_iteration_counts_up_and_resets() {
    let mut session = Session::new(config(), 0);
    assert_eq!(session.increment_validation_iteration(), 1);
    assert_eq!(session.increment_validation_iteration(), 2);
    session.reset_validation_iteration();
    assert_eq!(session.validation_iteration, 0);
}

#[test]
fn resume_runner_prefers_opencode_over_claude() {
    let mut session = Session::new(config(), 0);
    session.set_runner_session_id("claude", "claude-sess-1".into());
    session.set_runner_session_id("opencode", "oc-sess-1".into());
    assert_eq!(session.resume_runner(), Some(("opencode", "oc-sess-1")));
}

#[test]
fn resume_runner_none_for_fresh_session() {
    let session = Session::new(config(), 0);
    assert_eq!(session.resume_runner(), None);
}

#[test]
fn runner_session_id_for_returns_none_for_unused_runner() {
    let mut session = Session::new(config(), 0);
    session.set_runner_session_id("gemini", "gem-1".into());
    assert_eq!(session.runner_session_id_for("gemini"), Some("gem-1"));
    assert_eq!(session.runner_session_id_for("codex"), None);
}

#[test]
fn subroutine_visits_count_per_name() {
    let mut session = Session::new(config(), 0);
    assert_eq!(session.record_subroutine_visit("validate"), 1);
    assert_eq!(session.record_subroutine_visit("validate"), 2);
    assert_eq!(session.get_subroutine_visits("validate"), 2);
    assert_eq!(session.get_subroutine_visits("implement"), 0);
}
