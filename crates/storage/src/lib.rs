// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Persistence for Sylas: a JSONL write-ahead log, periodic zstd-compressed
//! snapshots with a version tag (so migrations can run forward), and the
//! [`MaterializedState`] that folds the two back into the picture the
//! engine works from at startup.

mod checkpoint;
mod migration;
mod snapshot;
mod state;
mod wal;

/// Current snapshot schema version. Bump when [`MaterializedState`]'s shape
/// changes in a way existing snapshots can't deserialize into directly, and
/// add the forward migration to [`migration::MigrationRegistry::new`].
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

pub use checkpoint::{
    load_snapshot, CheckpointError, CheckpointHandle, CheckpointResult, CheckpointWriter,
    Checkpointer, FsCheckpointWriter,
};
pub use migration::{Migration, MigrationError, MigrationRegistry};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::{AgentRecord, AgentRuntimeStatus, MaterializedState, Workspace};
pub use wal::{Wal, WalEntry, WalError};
