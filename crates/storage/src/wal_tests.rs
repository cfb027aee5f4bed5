// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write as _;
use tempfile::tempdir;

fn shutdown_event() -> Event {
    Event::Shutdown
}

fn token_event(repository_id: &str, expires_at_epoch_ms: u64) -> Event {
    Event::TokenRefreshed {
        repository_id: repository_id.to_string(),
        expires_at_epoch_ms,
    }
}

#[test]
fn append_and_flush_then_reopen_preserves_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&shutdown_event()).unwrap();
        wal.append(&token_event("repo-1", 1_000)).unwrap();
        wal.flush().unwrap();
        assert_eq!(wal.write_seq(), 2);
    }

    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 2);
    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].seq, 2);
}

#[test]
fn next_unprocessed_flushes_pending_writes_and_advances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");

    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&shutdown_event()).unwrap();
    wal.append(&token_event("repo-1", 1_000)).unwrap();

    let first = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(first.seq, 1);
    wal.mark_processed(first.seq);

    let second = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(second.seq, 2);
    wal.mark_processed(second.seq);

    assert!(wal.next_unprocessed().unwrap().is_none());
    assert_eq!(wal.processed_seq(), 2);
}

#[test]
fn reopen_with_processed_seq_skips_already_processed_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&shutdown_event()).unwrap();
        wal.append(&token_event("repo-1", 1_000)).unwrap();
        wal.append(&token_event("repo-2", 2_000)).unwrap();
        wal.flush().unwrap();
    }

    let mut wal = Wal::open(&path, 1).unwrap();
    let next = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(next.seq, 2);
}

#[test]
fn truncate_before_drops_old_entries_and_keeps_read_position() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");

    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&shutdown_event()).unwrap();
    wal.append(&token_event("repo-1", 1_000)).unwrap();
    wal.append(&token_event("repo-2", 2_000)).unwrap();
    wal.flush().unwrap();
    wal.mark_processed(2);

    wal.truncate_before(2).unwrap();

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);

    let next = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(next.seq, 3);
}

#[test]
fn needs_flush_is_true_once_buffer_is_non_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");

    let mut wal = Wal::open(&path, 0).unwrap();
    assert!(!wal.needs_flush());
    wal.append(&shutdown_event()).unwrap();
    assert!(wal.needs_flush());
    wal.flush().unwrap();
    assert!(!wal.needs_flush());
}

#[test]
fn corrupt_trailing_entry_is_dropped_and_valid_prefix_preserved() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&shutdown_event()).unwrap();
        wal.append(&token_event("repo-1", 1_000)).unwrap();
        wal.flush().unwrap();
    }

    // Append a garbage line directly, simulating a torn write.
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{not valid json\n").unwrap();
    }

    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 2);
    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);

    let bak_path = path.with_extension("bak");
    assert!(bak_path.exists());
}

#[test]
fn entries_after_seq_filters_correctly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");

    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&shutdown_event()).unwrap();
    wal.append(&token_event("repo-1", 1_000)).unwrap();
    wal.append(&token_event("repo-2", 2_000)).unwrap();
    wal.flush().unwrap();

    let entries = wal.entries_after(1).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);
}
