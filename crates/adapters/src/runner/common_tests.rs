// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn accumulator_withholds_terminal_event_until_exit() {
    let mut acc = DeltaAccumulator::new();
    acc.push(RunnerEvent::AssistantDelta("hello ".into()));
    acc.push(RunnerEvent::Complete { exit_code: Some(0) });
    let ready = acc.drain_ready();
    assert_eq!(ready, vec![RunnerEvent::AssistantDelta("hello ".into())]);

    acc.mark_exited(Some(0));
    let ready = acc.drain_ready();
    assert_eq!(ready, vec![RunnerEvent::Complete { exit_code: Some(0) }]);
}

#[test]
fn accumulator_tracks_running_text() {
    let mut acc = DeltaAccumulator::new();
    acc.push(RunnerEvent::AssistantDelta("foo".into()));
    acc.push(RunnerEvent::AssistantDelta("bar".into()));
    assert_eq!(acc.accumulated_text(), "foobar");
}

#[test]
fn accumulator_synthesizes_complete_if_none_seen() {
    let mut acc = DeltaAccumulator::new();
    acc.mark_exited(Some(1));
    assert_eq!(
        acc.drain_ready(),
        vec![RunnerEvent::Complete { exit_code: Some(1) }]
    );
}

#[test]
fn merge_mcp_configs_last_write_wins_per_key() {
    let defaults = serde_json::json!({"github": {"token": "a"}, "linear": {"key": "x"}});
    let overrides = serde_json::json!({"github": {"token": "b"}});
    let merged = merge_mcp_configs(&[defaults, overrides]);
    assert_eq!(merged["github"]["token"], "b");
    assert_eq!(merged["linear"]["key"], "x");
}

#[test]
fn parse_stream_json_line_extracts_session_id() {
    let line = r#"{"type":"system","session_id":"abc-123"}"#;
    assert_eq!(
        parse_stream_json_line(line),
        Some(RunnerEvent::SessionId("abc-123".into()))
    );
}

#[test]
fn parse_stream_json_line_extracts_assistant_text() {
    let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]}}"#;
    assert_eq!(
        parse_stream_json_line(line),
        Some(RunnerEvent::AssistantDelta("hi".into()))
    );
}

#[test]
fn parse_stream_json_line_extracts_tool_use() {
    let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"bash","input":{"command":"ls"}}]}}"#;
    match parse_stream_json_line(line) {
        Some(RunnerEvent::ToolUse { name, .. }) => assert_eq!(name, "bash"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn parse_stream_json_line_extracts_error_result() {
    let line = r#"{"type":"result","is_error":true,"result":"out of credits"}"#;
    assert_eq!(
        parse_stream_json_line(line),
        Some(RunnerEvent::Failed("out of credits".into()))
    );
}

#[test]
fn parse_stream_json_line_ignores_garbage() {
    assert_eq!(parse_stream_json_line("not json"), None);
}
