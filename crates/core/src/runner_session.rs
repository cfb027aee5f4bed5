// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner session identifier.
//!
//! `RunnerSessionId` identifies the underlying execution context a runner
//! adapter manages (a CLI process's own conversation/session id, e.g. the
//! `session_id` Claude Code reports on its first streamed message). This is
//! distinct from [`crate::agent::AgentId`], which identifies one logical
//! subroutine invocation, and from [`crate::session::ExternalSessionId`],
//! which identifies the tracker-facing session (an issue).

crate::define_id! {
    /// Unique identifier for a runner's own session/conversation.
    ///
    /// A single [`crate::session::Session`] may create a fresh
    /// `RunnerSessionId` for each subroutine, or resume a prior one when
    /// the procedure loops back to an earlier runner.
    pub struct RunnerSessionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_inner_string() {
        let id = RunnerSessionId::new("sess-abc123");
        assert_eq!(id.to_string(), "sess-abc123");
        assert_eq!(id.short(4), "sess");
    }
}
