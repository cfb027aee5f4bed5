// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn timer_id_display() {
    let id = TimerId::new("test-timer");
    assert_eq!(id.to_string(), "test-timer");
}

#[test]
fn timer_id_equality() {
    let id1 = TimerId::new("timer-1");
    let id2 = TimerId::new("timer-1");
    let id3 = TimerId::new("timer-2");

    assert_eq!(id1, id2);
    assert_ne!(id1, id3);
}

#[test]
fn timer_id_serde() {
    let id = TimerId::new("my-timer");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"my-timer\"");

    let parsed: TimerId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn liveness_timer_id() {
    let id = TimerId::liveness("sess-123");
    assert_eq!(id.as_str(), "liveness:sess-123");
}

#[test]
fn exit_deferred_timer_id() {
    let id = TimerId::exit_deferred("sess-123");
    assert_eq!(id.as_str(), "exit-deferred:sess-123");
}

#[test]
fn cooldown_timer_id_format() {
    let id = TimerId::cooldown("sess-123", "idle", 0);
    assert_eq!(id.as_str(), "cooldown:sess-123:idle:0");

    let id2 = TimerId::cooldown("sess-456", "exit", 2);
    assert_eq!(id2.as_str(), "cooldown:sess-456:exit:2");
}

#[test]
fn classifier_gate_timer_id() {
    let id = TimerId::classifier_gate("sess-123");
    assert_eq!(id.as_str(), "classifier-gate:sess-123");
    assert!(id.is_classifier_gate());
}

#[test]
fn is_liveness() {
    assert!(TimerId::new("liveness:sess-123").is_liveness());
    assert!(!TimerId::new("exit-deferred:sess-123").is_liveness());
    assert!(!TimerId::new("cooldown:sess-123:idle:0").is_liveness());
}

#[test]
fn is_exit_deferred() {
    assert!(TimerId::new("exit-deferred:sess-123").is_exit_deferred());
    assert!(!TimerId::new("liveness:sess-123").is_exit_deferred());
}

#[test]
fn is_cooldown() {
    assert!(TimerId::new("cooldown:sess-123:idle:0").is_cooldown());
    assert!(!TimerId::new("liveness:sess-123").is_cooldown());
}

#[test]
fn session_id_str_liveness() {
    let id = TimerId::new("liveness:sess-123");
    assert_eq!(id.session_id_str(), Some("sess-123"));
}

#[test]
fn session_id_str_cooldown_strips_trigger_and_pos() {
    let id = TimerId::new("cooldown:sess-789:idle:0");
    assert_eq!(id.session_id_str(), Some("sess-789"));
}

#[test]
fn session_id_str_unknown_timer_is_none() {
    let id = TimerId::new("other-timer");
    assert_eq!(id.session_id_str(), None);
}
