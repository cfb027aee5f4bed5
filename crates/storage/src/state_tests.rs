// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;
use std::path::PathBuf;
use sylas_core::AgentSignalKind;

fn created_event(id: &str, external_id: &str) -> Event {
    Event::SessionCreated {
        id: id.to_string(),
        external_session_id: external_id.to_string(),
        repository_id: "repo-1".to_string(),
        procedure_kind: "bugfix".to_string(),
        procedure_hash: "hash-1".to_string(),
        cwd: PathBuf::from("/ws/sess-1"),
        vars: HashMap::new(),
        initial_subroutine: "classify".to_string(),
        labels: vec![],
        created_at_epoch_ms: 1_000,
    }
}

#[test]
fn session_created_indexes_by_external_id() {
    let mut state = MaterializedState::new();
    state.apply_event(&created_event("sess-1", "ext-1"));

    assert!(state.get_session("sess-1").is_some());
    assert_eq!(
        state.session_for_external_id("ext-1").map(|s| s.id.as_str()),
        Some("sess-1")
    );
}

#[test]
fn session_advanced_updates_subroutine_and_records_visit() {
    let mut state = MaterializedState::new();
    state.apply_event(&created_event("sess-1", "ext-1"));
    state.apply_event(&Event::SessionAdvanced {
        id: "sess-1".to_string(),
        subroutine: "implement".to_string(),
    });

    let session = state.get_session("sess-1").unwrap();
    assert_eq!(session.subroutine, "implement");
    assert_eq!(session.get_subroutine_visits("implement"), 1);
}

#[test]
fn subroutine_started_tracks_agent_and_routes_agent_events() {
    let mut state = MaterializedState::new();
    state.apply_event(&created_event("sess-1", "ext-1"));
    state.apply_event(&Event::SubroutineStarted {
        session_id: "sess-1".to_string(),
        subroutine: "implement".to_string(),
        agent_id: Some(AgentId::new("agent-1")),
        runner_name: Some("claude".to_string()),
    });

    assert_eq!(state.session_id_for_agent(&AgentId::new("agent-1")), Some("sess-1"));

    state.apply_event(&Event::AgentWorking {
        agent_id: AgentId::new("agent-1"),
    });
    assert_eq!(
        state.agents.get(&AgentId::new("agent-1")).map(|r| r.status.clone()),
        Some(AgentRuntimeStatus::Working)
    );

    state.apply_event(&Event::AgentExited {
        agent_id: AgentId::new("agent-1"),
        exit_code: Some(0),
    });
    assert_eq!(
        state.agents.get(&AgentId::new("agent-1")).map(|r| r.status.clone()),
        Some(AgentRuntimeStatus::Exited(Some(0)))
    );
}

#[test]
fn subroutine_waiting_raises_decision_link() {
    let mut state = MaterializedState::new();
    state.apply_event(&created_event("sess-1", "ext-1"));
    state.apply_event(&Event::DecisionCreated {
        id: "dec-1".to_string(),
        session_id: "sess-1".to_string(),
        source: "gate".to_string(),
        context: "awaiting approval".to_string(),
        created_at_ms: 5_000,
    });
    state.apply_event(&Event::SubroutineWaiting {
        session_id: "sess-1".to_string(),
        subroutine: "classify".to_string(),
        reason: Some("approval gate".to_string()),
        decision_id: Some("dec-1".to_string()),
    });

    let session = state.get_session("sess-1").unwrap();
    assert!(session.subroutine_status.is_waiting());

    let decision = state.get_decision("dec-1").unwrap();
    assert!(!decision.is_resolved());
    assert_eq!(decision.repository_id, "repo-1");
}

#[test]
fn decision_resolved_records_choice() {
    let mut state = MaterializedState::new();
    state.apply_event(&created_event("sess-1", "ext-1"));
    state.apply_event(&Event::DecisionCreated {
        id: "dec-1".to_string(),
        session_id: "sess-1".to_string(),
        source: "validation_capped".to_string(),
        context: "retries exhausted".to_string(),
        created_at_ms: 5_000,
    });
    state.apply_event(&Event::DecisionResolved {
        id: "dec-1".to_string(),
        chosen: Some(1),
        message: Some("retry once more".to_string()),
        resolved_at_ms: 6_000,
    });

    let decision = state.get_decision("dec-1").unwrap();
    assert!(decision.is_resolved());
    assert_eq!(decision.chosen, Some(1));
}

#[test]
fn session_stop_ends_the_session() {
    let mut state = MaterializedState::new();
    state.apply_event(&created_event("sess-1", "ext-1"));
    state.apply_event(&Event::SessionStop {
        id: "sess-1".to_string(),
    });

    let session = state.get_session("sess-1").unwrap();
    assert!(session.is_terminal());
}

#[test]
fn workspace_lifecycle_folds_through_ready_and_deleted() {
    let mut state = MaterializedState::new();
    let id = WorkspaceId::new("ws-1");
    state.apply_event(&Event::WorkspaceCreated {
        id: id.clone(),
        path: PathBuf::from("/ws/1"),
        branch: None,
        owner_session_id: Some("sess-1".to_string()),
        workspace_type: None,
    });
    assert_eq!(state.get_workspace(&id).unwrap().status, WorkspaceStatus::Creating);

    state.apply_event(&Event::WorkspaceReady { id: id.clone() });
    assert_eq!(state.get_workspace(&id).unwrap().status, WorkspaceStatus::Ready);

    state.apply_event(&Event::WorkspaceDeleted { id: id.clone() });
    assert!(state.get_workspace(&id).is_none());
}

#[test]
fn token_refreshed_updates_expiry_without_storing_secret() {
    let mut state = MaterializedState::new();
    state.apply_event(&Event::TokenRefreshed {
        repository_id: "repo-1".to_string(),
        expires_at_epoch_ms: 99_999,
    });

    assert_eq!(state.token_expiry.get("repo-1"), Some(&99_999));
}

#[test]
fn shutdown_event_sets_flag() {
    let mut state = MaterializedState::new();
    assert!(!state.shutting_down);
    state.apply_event(&Event::Shutdown);
    assert!(state.shutting_down);
}

#[test]
fn agent_signal_event_is_a_no_op_fold() {
    // AgentSignal is acted on directly by the procedure engine; folding it
    // must not panic even when no agent record exists yet.
    let mut state = MaterializedState::new();
    state.apply_event(&Event::AgentSignal {
        agent_id: AgentId::new("agent-unknown"),
        kind: AgentSignalKind::Complete,
        message: None,
    });
    assert!(state.agents.is_empty());
}
