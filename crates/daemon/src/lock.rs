// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-instance enforcement via an exclusive `flock` on a PID file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use fs2::FileExt;

pub struct DaemonLock {
    // Held open for the process lifetime; dropping releases the flock.
    #[allow(dead_code)]
    file: std::fs::File,
}

/// Acquire the daemon's single-instance lock, failing if another `sylasd`
/// already holds it.
pub fn acquire(path: &Path) -> anyhow::Result<DaemonLock> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Open without truncating first; a failed lock must not wipe the
    // running daemon's PID.
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(|err| anyhow::anyhow!("sylasd already running ({path:?}): {err}"))?;

    let mut file = file;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(DaemonLock { file })
}
