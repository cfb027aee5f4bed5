// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::MaterializedState;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use sylas_core::{Session, SessionConfig};
use tempfile::tempdir;

fn test_config(id: &str) -> SessionConfig {
    SessionConfig {
        id: id.to_string(),
        external_session_id: format!("ext-{id}"),
        repository_id: "repo-1".to_string(),
        procedure_kind: "bugfix".to_string(),
        vars: HashMap::new(),
        procedure_hash: "testhash".to_string(),
        cwd: PathBuf::from("/test/project"),
        initial_subroutine: "classify".to_string(),
        labels: vec![],
    }
}

fn create_test_state() -> MaterializedState {
    let mut state = MaterializedState::default();
    let session = Session::new(test_config("sess-1"), 0);
    state.sessions.insert("sess-1".to_string(), session);
    state
}

#[test]
fn test_snapshot_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let state = create_test_state();
    let snapshot = Snapshot::new(42, state);

    snapshot.save(&path).unwrap();
    assert!(path.exists());

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 42);
    assert_eq!(loaded.state.sessions.len(), 1);
    assert!(loaded.state.sessions.contains_key("sess-1"));
}

#[test]
fn test_load_nonexistent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nonexistent.json");

    let result = Snapshot::load(&path).unwrap();
    assert!(result.is_none());
}

#[test]
fn test_snapshot_atomic_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let tmp_path = path.with_extension("tmp");

    let state = create_test_state();
    let snapshot = Snapshot::new(1, state);

    snapshot.save(&path).unwrap();

    assert!(!tmp_path.exists());
    assert!(path.exists());
}

#[test]
fn test_snapshot_preserves_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut state = MaterializedState::default();

    for i in 0..3 {
        let id = format!("sess-{i}");
        let mut config = test_config(&id);
        config.vars = HashMap::from([("key".to_string(), format!("value-{i}"))]);
        let session = Session::new(config, 0);
        state.sessions.insert(id, session);
    }

    let snapshot = Snapshot::new(100, state);
    snapshot.save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 100);
    assert_eq!(loaded.state.sessions.len(), 3);

    for i in 0..3 {
        let key = format!("sess-{i}");
        let session = loaded.state.sessions.get(&key).unwrap();
        assert_eq!(session.vars.get("key"), Some(&format!("value-{i}")));
    }
}

#[test]
fn test_load_corrupt_snapshot_returns_none_and_creates_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut f = File::create(&path).unwrap();
    f.write_all(b"\xe5\x03\x01binary-garbage").unwrap();
    drop(f);

    let result = Snapshot::load(&path).unwrap();
    assert!(result.is_none());

    assert!(!path.exists());
    let bak = path.with_extension("bak");
    assert!(bak.exists());
}

#[test]
fn test_load_corrupt_snapshot_rotates_bak_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    for i in 1..=4u8 {
        let mut f = File::create(&path).unwrap();
        f.write_all(&[i; 4]).unwrap();
        drop(f);

        let result = Snapshot::load(&path).unwrap();
        assert!(result.is_none());
    }

    let bak1 = path.with_extension("bak");
    assert!(bak1.exists());
    assert_eq!(fs::read(&bak1).unwrap(), vec![4u8; 4]);

    let bak2 = path.with_extension("bak.2");
    assert!(bak2.exists());
    assert_eq!(fs::read(&bak2).unwrap(), vec![3u8; 4]);

    let bak3 = path.with_extension("bak.3");
    assert!(bak3.exists());
    assert_eq!(fs::read(&bak3).unwrap(), vec![2u8; 4]);

    let bak4 = path.with_extension("bak.4");
    assert!(!bak4.exists());
}

#[test]
fn test_snapshot_round_trip_with_action_attempts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut state = MaterializedState::default();
    let mut session = Session::new(test_config("sess-1"), 0);

    session.increment_action_attempt("on_idle", 0);
    session.increment_action_attempt("on_idle", 0);
    session.increment_action_attempt("on_fail", 1);

    state.sessions.insert("sess-1".to_string(), session);

    let snapshot = Snapshot::new(50, state);
    snapshot.save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 50);

    let s = loaded.state.sessions.get("sess-1").unwrap();
    assert_eq!(s.get_action_attempt("on_idle", 0), 2);
    assert_eq!(s.get_action_attempt("on_fail", 1), 1);
    assert_eq!(s.get_action_attempt("unknown", 0), 0);
}
