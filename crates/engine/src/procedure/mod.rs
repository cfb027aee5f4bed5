// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed procedure table and the advance/validation-loop logic that
//! drives a [`Session`] through it.
//!
//! The table itself (which subroutines belong to which procedure, and
//! which subroutines carry special behaviour flags) is fixed at process
//! start: it ships embedded in the binary rather than read from disk, so
//! there is no way for a misconfigured deploy to drift from the code that
//! interprets it.

pub mod classifier;

use crate::error::RuntimeError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use sylas_core::{Session, SubroutineOutcome, SubroutineStatus};

/// Fixed iteration cap for the validation loop before escalating to a human.
pub const VALIDATION_LOOP_CAP: u32 = 3;

const EMBEDDED_TABLE: &str = include_str!("../../procedures.toml");

#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(rename = "procedure", default)]
    procedures: Vec<RawProcedure>,
    #[serde(rename = "subroutine", default)]
    subroutines: Vec<RawSubroutine>,
}

#[derive(Debug, Deserialize)]
struct RawProcedure {
    name: String,
    subroutines: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawSubroutine {
    name: String,
    #[serde(default)]
    uses_validation_loop: bool,
    #[serde(default)]
    requires_approval: bool,
    #[serde(default)]
    single_turn: bool,
    #[serde(default)]
    disallow_all_tools: bool,
    #[serde(default)]
    suppress_thought_posting: bool,
}

/// One named procedure: an ordered list of subroutine names.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: String,
    pub subroutines: Vec<String>,
}

/// Behaviour flags for a subroutine, looked up by name across every
/// procedure that references it. A subroutine with no `[[subroutine]]`
/// entry gets every flag `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubroutineSpec {
    pub uses_validation_loop: bool,
    pub requires_approval: bool,
    pub single_turn: bool,
    pub disallow_all_tools: bool,
    pub suppress_thought_posting: bool,
}

/// The parsed, queryable procedure table.
#[derive(Debug)]
pub struct ProcedureTable {
    procedures: HashMap<String, Procedure>,
    specs: HashMap<String, SubroutineSpec>,
}

static EMBEDDED: OnceLock<ProcedureTable> = OnceLock::new();

impl ProcedureTable {
    /// Parse a procedure table from TOML text in the shape documented by
    /// `procedures.toml`.
    pub fn parse(toml_text: &str) -> Result<Self, RuntimeError> {
        let raw: RawTable =
            toml::from_str(toml_text).map_err(|e| RuntimeError::ProcedureTableInvalid(e.to_string()))?;

        let mut procedures = HashMap::new();
        for p in raw.procedures {
            procedures.insert(
                p.name.clone(),
                Procedure {
                    name: p.name,
                    subroutines: p.subroutines,
                },
            );
        }

        let mut specs = HashMap::new();
        for s in raw.subroutines {
            specs.insert(
                s.name.clone(),
                SubroutineSpec {
                    uses_validation_loop: s.uses_validation_loop,
                    requires_approval: s.requires_approval,
                    single_turn: s.single_turn,
                    disallow_all_tools: s.disallow_all_tools,
                    suppress_thought_posting: s.suppress_thought_posting,
                },
            );
        }

        Ok(Self { procedures, specs })
    }

    /// The table embedded in this binary, parsed once and cached.
    pub fn embedded() -> &'static ProcedureTable {
        EMBEDDED.get_or_init(|| {
            Self::parse(EMBEDDED_TABLE).unwrap_or_else(|e| {
                // The embedded table is compiled into the binary; a parse
                // failure here means the binary itself is broken.
                panic!("embedded procedures.toml failed to parse: {e}")
            })
        })
    }

    pub fn get(&self, procedure_name: &str) -> Option<&Procedure> {
        self.procedures.get(procedure_name)
    }

    /// A content hash of the embedded table, stamped onto every session so
    /// a snapshot restored under a newer binary can tell whether its
    /// procedure definition has since changed underneath it.
    pub fn hash(&self) -> String {
        hash_text(EMBEDDED_TABLE)
    }

    pub fn spec(&self, subroutine_name: &str) -> SubroutineSpec {
        self.specs.get(subroutine_name).copied().unwrap_or_default()
    }

    fn index_of(&self, procedure: &Procedure, subroutine_name: &str) -> Option<usize> {
        procedure.subroutines.iter().position(|s| s == subroutine_name)
    }

    /// The subroutine a session is currently on, or `None` if the session's
    /// procedure/subroutine pair isn't in the table (a terminal sink name
    /// like `done`/`failed`/`cancelled`, or data corruption).
    pub fn current_subroutine<'a>(&'a self, session: &Session) -> Option<&'a str> {
        let procedure = self.get(&session.procedure_kind)?;
        let idx = self.index_of(procedure, &session.subroutine)?;
        procedure.subroutines.get(idx).map(String::as_str)
    }

    /// The subroutine that follows the session's current one, or `None` if
    /// the current subroutine is the procedure's last.
    pub fn next_subroutine<'a>(&'a self, session: &Session) -> Option<&'a str> {
        let procedure = self.get(&session.procedure_kind)?;
        let idx = self.index_of(procedure, &session.subroutine)?;
        procedure.subroutines.get(idx + 1).map(String::as_str)
    }

    pub fn is_complete(&self, session: &Session) -> bool {
        self.next_subroutine(session).is_none()
    }

    /// The first subroutine of `procedure_name`, for building the
    /// [`sylas_core::SessionConfig`] a brand-new session is constructed
    /// with. Constructing directly this way (rather than building a
    /// placeholder `Session` and calling [`Self::reset`] on it) keeps a
    /// fresh session's history at exactly one entry.
    pub fn initial_subroutine(&self, procedure_name: &str) -> Result<&str, RuntimeError> {
        self.get(procedure_name)
            .and_then(|p| p.subroutines.first())
            .map(String::as_str)
            .ok_or_else(|| RuntimeError::UnknownProcedure(procedure_name.to_string()))
    }

    /// Abandon whatever subroutine an already-running session is on and
    /// restart it at the first subroutine of `procedure_name`. Used when a
    /// new prompt arrives on an active session: the engine re-classifies
    /// and re-initialises rather than continuing the old procedure.
    pub fn reset(
        &self,
        session: &mut Session,
        procedure_name: &str,
        epoch_ms: u64,
    ) -> Result<(), RuntimeError> {
        let first = self.initial_subroutine(procedure_name)?.to_string();

        session.finalize_current_subroutine(
            SubroutineOutcome::Failed("procedure reset by new prompt".to_string()),
            epoch_ms,
        );
        session.procedure_kind = procedure_name.to_string();
        session.procedure_hash = self.hash();
        session.subroutine = first.clone();
        session.subroutine_status = SubroutineStatus::Pending;
        session.reset_validation_iteration();
        session.push_subroutine(&first, epoch_ms);
        session.record_subroutine_visit(&first);
        Ok(())
    }

    /// Finish the current subroutine and move to the next one.
    ///
    /// `result` is logged for operator visibility; the durable
    /// [`SubroutineRecord`](sylas_core::SubroutineRecord) only tracks pass/fail,
    /// not free text, so a richer transcript belongs in the activity relay,
    /// not in session history.
    pub fn advance(
        &self,
        session: &mut Session,
        epoch_ms: u64,
        runner_name: Option<&str>,
        runner_session_id: Option<&str>,
        result: Option<&str>,
    ) -> Outcome {
        if let Some(text) = result {
            tracing::info!(session_id = %session.id, subroutine = %session.subroutine, result = text, "subroutine result");
        }

        let spec = self.spec(&session.subroutine);
        if spec.requires_approval && session.subroutine_status != SubroutineStatus::Waiting(None) {
            session.update_current_subroutine_outcome(SubroutineOutcome::Waiting(
                "awaiting approval".to_string(),
            ));
            session.subroutine_status = SubroutineStatus::Waiting(None);
            return Outcome::AwaitingApproval;
        }

        if let (Some(runner), Some(id)) = (runner_name, runner_session_id) {
            session.set_runner_session_id(runner, id.to_string());
            session.set_current_subroutine_runner_name(runner);
        }

        session.finalize_current_subroutine(SubroutineOutcome::Completed, epoch_ms);

        match self.next_subroutine(session) {
            Some(next) => {
                let next = next.to_string();
                session.subroutine = next.clone();
                session.subroutine_status = SubroutineStatus::Pending;
                session.push_subroutine(&next, epoch_ms);
                let visits = session.record_subroutine_visit(&next);
                if visits > sylas_core::MAX_SUBROUTINE_VISITS {
                    Outcome::CircuitBreaker
                } else {
                    Outcome::Advanced
                }
            }
            None => Outcome::ProcedureComplete,
        }
    }

    /// Clear the `awaiting_approval` wait so the next [`Self::advance`] call
    /// on this session actually advances instead of re-entering the gate.
    /// Called by the session lifecycle manager when an explicit
    /// user-prompt message approves a gated subroutine.
    pub fn approve(&self, session: &mut Session) {
        session.subroutine_status = SubroutineStatus::Running;
    }

    /// Record the outcome of a `{pass, reason}` structured validation check
    /// for a subroutine with `uses_validation_loop`. On failure, inserts a
    /// `validation-fixer` subroutine and reruns; after [`VALIDATION_LOOP_CAP`]
    /// failures in a row, escalates instead of looping again.
    pub fn record_validation(
        &self,
        session: &mut Session,
        epoch_ms: u64,
        pass: bool,
        reason: &str,
    ) -> Outcome {
        if pass {
            session.reset_validation_iteration();
            return self.advance(session, epoch_ms, None, None, Some(reason));
        }

        let iteration = session.increment_validation_iteration();
        session.update_current_subroutine_outcome(SubroutineOutcome::Failed(reason.to_string()));
        if iteration > VALIDATION_LOOP_CAP {
            return Outcome::ValidationCapped;
        }

        session.finalize_current_subroutine(SubroutineOutcome::Failed(reason.to_string()), epoch_ms);
        session.subroutine = "validation-fixer".to_string();
        session.subroutine_status = SubroutineStatus::Pending;
        session.push_subroutine("validation-fixer", epoch_ms);
        session.record_subroutine_visit("validation-fixer");
        Outcome::ValidationFixer
    }
}

/// What happened as a result of an advance/validation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Moved to the next subroutine in the procedure.
    Advanced,
    /// The current subroutine requires approval; the session now waits for
    /// an explicit user-prompt message before advancing.
    AwaitingApproval,
    /// There was no next subroutine: the procedure has finished.
    ProcedureComplete,
    /// Validation failed and a `validation-fixer` subroutine was inserted.
    ValidationFixer,
    /// Validation failed more than [`VALIDATION_LOOP_CAP`] times in a row.
    ValidationCapped,
    /// The subroutine visit count exceeded
    /// [`sylas_core::MAX_SUBROUTINE_VISITS`]; the session should be failed.
    CircuitBreaker,
}

/// A label the classifier can return, and the built-in `label -> procedure`
/// mapping used when no tracker-label override applies.
pub fn label_to_procedure(label: &str) -> Option<&'static str> {
    match label {
        "question" => Some("simple-question"),
        "documentation" => Some("documentation-edit"),
        "transient" => Some("full-delegation"),
        "planning" => Some("plan-mode"),
        "code" => Some("full-development"),
        "debugger" => Some("debugger-full"),
        "orchestrator" => Some("orchestrator-full"),
        "user-testing" => Some("user-testing"),
        "release" => Some("release"),
        _ => None,
    }
}

/// The known classifier label set, for validating a runner's raw output.
pub const KNOWN_LABELS: [&str; 9] = [
    "question",
    "documentation",
    "transient",
    "planning",
    "code",
    "debugger",
    "orchestrator",
    "user-testing",
    "release",
];

fn hash_text(text: &str) -> String {
    // FNV-1a: the table's identity only needs to be stable and cheap to
    // compute, not cryptographically strong.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
