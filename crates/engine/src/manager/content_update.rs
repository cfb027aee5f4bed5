// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `content_update` handling: no session action. The updated issue is
//! refetched lazily on next event; the `Event::TrackerMessageReceived` fact
//! recorded by the caller before dispatch is the only durable trace of this
//! message, since there is nothing else to fold into session state here.

use sylas_core::{Clock, IdGen, RepositoryId};
use sylas_tracker::translate::Message;

use crate::error::RuntimeError;

use super::Manager;

impl<C, G> Manager<C, G>
where
    C: Clock + Clone + Send + Sync + 'static,
    G: IdGen + 'static,
{
    pub(super) async fn handle_content_update(
        &self,
        repository_id: &RepositoryId,
        message: &Message,
    ) -> Result<(), RuntimeError> {
        tracing::debug!(
            repository_id = %repository_id,
            session_key = %message.session_key,
            "content update received, deferring refetch to next event"
        );
        Ok(())
    }
}
