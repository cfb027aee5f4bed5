// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn agent_id_short_truncates() {
    let id = AgentId::new("sess-12345678-triage");
    assert_eq!(id.short(8), "sess-123");
}

#[test]
fn agent_state_display_includes_exit_code() {
    let state = AgentState::Exited { exit_code: Some(2) };
    assert_eq!(state.to_string(), "exited with code 2");
}

#[test]
fn agent_state_display_omits_missing_exit_code() {
    let state = AgentState::Exited { exit_code: None };
    assert_eq!(state.to_string(), "exited");
}

#[test]
fn agent_error_display_matches_known_reasons() {
    assert_eq!(AgentError::Unauthorized.to_string(), "unauthorized");
    assert_eq!(AgentError::OutOfCredits.to_string(), "out of credits");
    assert_eq!(
        AgentError::Other("weird failure".into()).to_string(),
        "weird failure"
    );
}

#[test]
fn agent_state_serde_roundtrip() {
    let state = AgentState::Failed(AgentError::RateLimited);
    let json = serde_json::to_string(&state).unwrap();
    let parsed: AgentState = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, state);
}
