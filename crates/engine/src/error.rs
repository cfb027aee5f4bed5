// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine runtime

use crate::ExecuteError;
use thiserror::Error;

/// Errors that can occur in the runtime.
///
/// Most of these are logged and folded into session state rather than
/// propagated to a caller — see the error taxonomy in DESIGN.md for which
/// kinds are retried, which fall back, and which end the session with an
/// error note.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("execute error: {0}")]
    Execute(#[from] ExecuteError),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),
    #[error("unknown procedure: {0}")]
    UnknownProcedure(String),
    #[error("no subroutine at index {index} in procedure {procedure}")]
    SubroutineIndexOutOfRange { procedure: String, index: usize },
    #[error("classifier call failed: {0}")]
    ClassifierFailed(String),
    #[error("classifier returned unrecognised label: {0}")]
    UnknownLabel(String),
    #[error("runner adapter not found for kind: {0}")]
    RunnerKindNotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("embedded procedure table failed to parse: {0}")]
    ProcedureTableInvalid(String),
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error("write-ahead log error: {0}")]
    Wal(String),
}
