// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message translator: converts a verified, tracker-specific webhook
//! payload into exactly one of a small closed set of internal [`Message`]s,
//! or a [`TranslateError`] naming why it could not.
//!
//! `can_translate` is strict on purpose: an unrecognised `(type, action)`
//! pair is a translation failure, never a silent pass-through, so ingress
//! can 200-ack it and stop the tracker from retrying.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single, platform-neutral fact the lifecycle manager can act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// A new agent session was created on an issue or comment.
    SessionStart {
        initial_prompt: String,
        labels: Vec<String>,
        issue_id: String,
        issue_identifier: String,
        /// True iff the opening comment does not contain the
        /// agent-session marker string.
        mention_triggered: bool,
    },
    /// A new message arrived in an existing session.
    UserPrompt { text: String, author: String },
    /// Explicit stop from the tracker.
    StopSignal,
    /// The work item was unassigned from the agent.
    Unassign,
    /// Issue title/description/attachments changed.
    ContentUpdate {
        before_title: String,
        after_title: String,
        before_description: String,
        after_description: String,
        changed: Vec<String>,
    },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::SessionStart { .. } => "session_start",
            MessageBody::UserPrompt { .. } => "user_prompt",
            MessageBody::StopSignal => "stop_signal",
            MessageBody::Unassign => "unassign",
            MessageBody::ContentUpdate { .. } => "content_update",
        }
    }
}

/// Every internal message carries these envelope fields regardless of body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub source: &'static str,
    pub action: String,
    pub received_at_epoch_ms: u64,
    pub organization_id: String,
    /// Stable across webhook retries; the lifecycle manager's
    /// per-session serialisation key.
    pub session_key: String,
    pub work_item_id: String,
    pub work_item_identifier: String,
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot translate webhook: {reason}")]
pub struct TranslateError {
    pub reason: String,
}

/// Context a translator needs beyond the payload itself.
pub struct TranslateContext<'a> {
    pub tracker_id: &'a str,
    pub organization_id: &'a str,
    pub bot_token: Option<&'a str>,
    pub received_at_epoch_ms: u64,
}

/// The marker Sylas looks for in an opening comment to decide whether the
/// session was started by an explicit @-mention versus assignment/label.
pub const AGENT_SESSION_MARKER: &str = "<!-- sylas:agent-session -->";

pub trait Translator {
    /// Cheap pre-check so ingress can reject unknown shapes before doing
    /// any further parsing work.
    fn can_translate(&self, payload: &Value) -> bool;

    fn translate(
        &self,
        payload: &Value,
        ctx: &TranslateContext<'_>,
    ) -> Result<Message, TranslateError>;
}

pub mod linear;
pub mod slack;
