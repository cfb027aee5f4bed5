// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sylas-core: shared domain types for the Sylas edge worker.
//!
//! This crate is the pure, dependency-free layer: identifiers, the
//! [`Event`] log and [`Effect`] vocabulary, the [`Session`]/[`Repository`]
//! entities, and the [`Clock`] abstraction. Nothing here touches a
//! filesystem, a socket, or a child process — that belongs to
//! `sylas-storage`, `sylas-runners`, and `sylas-daemon`.

pub mod action_tracker;
pub mod agent;
pub mod clock;
pub mod decision;
pub mod effect;
pub mod event;
pub mod id;
pub mod namespace;
pub mod repository;
pub mod runner_session;
pub mod session;
pub mod time_fmt;
pub mod timer;
pub mod workspace;

pub use action_tracker::{ActionTracker, AgentSignal};
pub use agent::{AgentError, AgentId, AgentState};
pub use clock::{Clock, FakeClock, SystemClock};
pub use decision::{Decision, DecisionId, DecisionOption, DecisionSource};
pub use effect::Effect;
pub use event::{AgentSignalKind, Event, PromptType, QuestionData, QuestionEntry, QuestionOption};
pub use id::{IdGen, SequentialIdGen, ShortId, UuidIdGen};
pub use namespace::{scoped_name, split_scoped_name};
pub use repository::{Repository, RepositoryId, TrackerKind, WebhookAuthMode};
pub use runner_session::RunnerSessionId;
pub use session::{
    ExternalSessionId, Session, SessionConfig, SessionStatus, SubroutineOutcome,
    SubroutineOutcomeKind, SubroutineRecord, SubroutineStatus, SubroutineStatusKind,
    MAX_SUBROUTINE_VISITS,
};
pub use time_fmt::{format_elapsed, format_elapsed_ms};
pub use timer::TimerId;
pub use workspace::{WorkspaceId, WorkspaceStatus};
