// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn event_serializes_with_type_tag() {
    let event = Event::SessionAdvanced {
        id: "sess-1".into(),
        subroutine: "implement".into(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "session:advanced");
    assert_eq!(json["subroutine"], "implement");
}

#[test]
fn event_roundtrips_through_json() {
    let event = Event::AgentSignal {
        agent_id: AgentId::new("agent-1"),
        kind: AgentSignalKind::Escalate,
        message: Some("needs human review".into()),
    };
    let json = serde_json::to_string(&event).unwrap();
    let parsed: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, event);
}

#[test]
fn from_agent_state_maps_each_variant() {
    let agent_id = AgentId::new("agent-1");
    assert_eq!(
        Event::from_agent_state(agent_id.clone(), AgentState::Working),
        Event::AgentWorking {
            agent_id: agent_id.clone()
        }
    );
    assert_eq!(
        Event::from_agent_state(agent_id.clone(), AgentState::SessionGone),
        Event::AgentGone {
            agent_id: agent_id.clone()
        }
    );
    assert_eq!(
        Event::from_agent_state(agent_id.clone(), AgentState::Exited { exit_code: Some(1) }),
        Event::AgentExited {
            agent_id,
            exit_code: Some(1)
        }
    );
}

#[test]
fn log_summary_includes_event_name_and_primary_id() {
    let event = Event::SubroutineFailed {
        session_id: "sess-12345678".into(),
        subroutine: "validate".into(),
        error: "exit code 1".into(),
    };
    let summary = event.log_summary();
    assert!(summary.starts_with("subroutine:failed"));
    assert!(summary.contains("validate"));
}

#[test]
fn unknown_vars_default_to_empty_map_on_deserialize() {
    let json = r#"{"type":"session:updated","id":"sess-1"}"#;
    let event: Event = serde_json::from_str(json).unwrap();
    match event {
        Event::SessionUpdated { vars, .. } => assert!(vars.is_empty()),
        other => panic!("unexpected variant: {other:?}"),
    }
}
