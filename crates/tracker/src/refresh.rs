// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide OAuth refresh singleflight: a mapping from workspace id to
//! a shared future.
//! The first caller creates the future and stores it; every other caller
//! observing a 401 for the same workspace subscribes to the same clone
//! instead of issuing its own refresh request.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use sylas_core::repository::TrackerCredential;

use crate::service::{TrackerError, WorkspaceKey};

type RefreshFuture = Shared<BoxFuture<'static, Result<TrackerCredential, Arc<TrackerError>>>>;

/// Callback invoked once a refresh succeeds, so the caller can persist the
/// new tokens. Persistence failure is logged by the caller and never
/// cancels the refresh.
pub type OnTokenRefresh = Arc<dyn Fn(TrackerCredential) + Send + Sync>;

#[derive(Default)]
pub struct RefreshCoordinator {
    inflight: Mutex<HashMap<WorkspaceKey, RefreshFuture>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `do_refresh` for `key`, coalescing concurrent callers onto one
    /// in-flight future. Removes the slot once the future resolves so the
    /// next 401 may retry afresh.
    ///
    /// `on_refreshed` is wrapped into the future itself, so it only fires
    /// once per actual refresh regardless of how many callers coalesce onto
    /// it: a `Shared` future runs its inner body exactly once and replays the
    /// cached output to every other `.await`.
    pub async fn refresh(
        &self,
        key: WorkspaceKey,
        do_refresh: impl FnOnce() -> BoxFuture<'static, Result<TrackerCredential, TrackerError>>,
        on_refreshed: OnTokenRefresh,
    ) -> Result<TrackerCredential, TrackerError> {
        let fut: RefreshFuture = {
            let mut inflight = self.inflight.lock();
            inflight
                .entry(key.clone())
                .or_insert_with(move || {
                    let refreshing = do_refresh();
                    async move {
                        let result = refreshing.await;
                        if let Ok(cred) = &result {
                            on_refreshed(cred.clone());
                        }
                        result.map_err(Arc::new)
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };

        let result = fut.await;
        self.inflight.lock().remove(&key);

        result.map_err(|e| TrackerError::OperationFailed {
            op: "refresh_token",
            reason: e.to_string(),
        })
    }
}
