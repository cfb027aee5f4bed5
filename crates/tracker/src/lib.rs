// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sylas-tracker: the tracker-service abstraction, webhook message
//! translation, and HTTP ingress.
//!
//! This is the only crate that knows the wire shape of any tracker's API;
//! everything above it speaks [`service::TrackerService`] and
//! [`translate::Message`].

pub mod ingress;
pub mod refresh;
pub mod service;
pub mod service_impl;
pub mod translate;

pub use ingress::{IngressState, MessageSink, RepoRoute, VerificationMode};
pub use refresh::{OnTokenRefresh, RefreshCoordinator};
pub use service::{TrackerError, TrackerService};
pub use service_impl::cli_mock::CliMockTracker;
pub use service_impl::linear::LinearTracker;
pub use service_impl::slack_mirror::SlackMirrorTracker;
pub use translate::{Message, MessageBody, TranslateContext, TranslateError, Translator};
