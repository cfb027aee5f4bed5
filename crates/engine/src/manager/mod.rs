// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session lifecycle manager: the daemon's single consumer of inbound
//! tracker messages and runner events, and the only writer to the WAL.
//!
//! Every message the ingress layer hands it is processed under
//! [`crate::keyed_mutex::KeyedMutex`], keyed by [`Message::session_key`], so
//! two webhooks for the same tracker thread are always handled in arrival
//! order while unrelated sessions never wait on one another. State changes
//! only ever happen by executing an [`Effect`] through [`Executor`] and
//! appending the resulting [`Event`] to the WAL; nothing in this module
//! mutates [`MaterializedState`] directly.

mod content_update;
mod runner_events;
mod runner_select;
mod session_start;
mod shutdown;
mod stop;
mod timers;
mod user_prompt;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sylas_core::{Clock, Effect, Event, IdGen, RepositoryId, Repository};
use sylas_runners::{RunnerAdapter, RunnerEvent};
use sylas_storage::{MaterializedState, Wal};
use sylas_tracker::translate::Message;
use sylas_tracker::{MessageSink, TrackerService};
use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::keyed_mutex::KeyedMutex;
use crate::scheduler::Scheduler;
use crate::workspace::WorkspaceFactory;

pub(crate) use runner_select::{build_runner_config, select_runner_kind};

/// How often the manager confirms a session's runner is still alive.
/// Re-armed on every observed runner event; see [`runner_events`].
pub(crate) const LIVENESS_INTERVAL: Duration = Duration::from_secs(45);

/// How often the manager's event loop sweeps for fired timers.
const TIMER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Everything [`Manager::new`] needs, gathered in one place so the daemon's
/// startup sequence (load config, load snapshot, replay WAL, build
/// adapters) has one constructor to call once all of that is ready.
pub struct ManagerDeps<C: Clock, G: IdGen> {
    pub runners: HashMap<String, Arc<dyn RunnerAdapter>>,
    pub trackers: HashMap<RepositoryId, Arc<dyn TrackerService>>,
    pub workspaces: Arc<dyn WorkspaceFactory>,
    pub repositories: HashMap<RepositoryId, Repository>,
    pub wal: Arc<Mutex<Wal>>,
    pub initial_state: MaterializedState,
    pub clock: C,
    pub ids: G,
    /// Runner kind used for one-shot request classification.
    pub classifier_runner: String,
}

/// The session lifecycle manager.
pub struct Manager<C: Clock, G: IdGen> {
    pub(crate) executor: Executor<C>,
    pub(crate) wal: Arc<Mutex<Wal>>,
    pub(crate) keyed: KeyedMutex,
    pub(crate) repositories: HashMap<RepositoryId, Repository>,
    pub(crate) trackers: HashMap<RepositoryId, Arc<dyn TrackerService>>,
    pub(crate) runners: HashMap<String, Arc<dyn RunnerAdapter>>,
    pub(crate) clock: C,
    pub(crate) ids: G,
    pub(crate) classifier_runner: String,
    /// Running text of the current subroutine's assistant output, per agent.
    /// The runner event stream only carries incremental deltas; the final
    /// turn's text (needed for validation-loop parsing and the summary
    /// activity) is accumulated here and cleared once the agent's turn ends.
    pub(crate) response_buffers: Mutex<HashMap<sylas_core::AgentId, String>>,
}

impl<C, G> Manager<C, G>
where
    C: Clock + Clone + Send + Sync + 'static,
    G: IdGen + 'static,
{
    /// Build the manager and the runner-event receiver its own event loop
    /// will drain once [`Self::spawn`] is called.
    pub fn new(deps: ManagerDeps<C, G>) -> (Self, mpsc::UnboundedReceiver<(sylas_core::AgentId, RunnerEvent)>) {
        let (runner_event_tx, runner_event_rx) = mpsc::unbounded_channel();
        let executor = Executor::new(
            deps.runners.clone(),
            deps.trackers.clone(),
            deps.workspaces,
            Arc::new(Mutex::new(deps.initial_state)),
            Arc::new(Mutex::new(Scheduler::new())),
            deps.clock.clone(),
            runner_event_tx,
        );
        let manager = Self {
            executor,
            wal: deps.wal,
            keyed: KeyedMutex::new(),
            repositories: deps.repositories,
            trackers: deps.trackers,
            runners: deps.runners,
            clock: deps.clock,
            ids: deps.ids,
            classifier_runner: deps.classifier_runner,
            response_buffers: Mutex::new(HashMap::new()),
        };
        (manager, runner_event_rx)
    }

    /// Start the manager's event loop and hand back a [`MessageSink`] the
    /// HTTP ingress router can be wired to, plus the manager handle itself
    /// (for the daemon's `/status` endpoint and shutdown sequence).
    pub fn spawn(self, runner_event_rx: mpsc::UnboundedReceiver<(sylas_core::AgentId, RunnerEvent)>) -> (Arc<Self>, MessageSink) {
        let manager = Arc::new(self);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<(RepositoryId, Message)>();

        let loop_manager = manager.clone();
        tokio::spawn(loop_manager.run(inbox_rx, runner_event_rx));

        let sink_tx = inbox_tx;
        let sink: MessageSink = Arc::new(move |repository_id, message| {
            if sink_tx.send((repository_id, message)).is_err() {
                tracing::error!("session lifecycle manager inbox is closed, dropping message");
            }
        });
        (manager, sink)
    }

    async fn run(
        self: Arc<Self>,
        mut inbox: mpsc::UnboundedReceiver<(RepositoryId, Message)>,
        mut runner_events: mpsc::UnboundedReceiver<(sylas_core::AgentId, RunnerEvent)>,
    ) {
        let mut ticker = tokio::time::interval(TIMER_POLL_INTERVAL);
        loop {
            tokio::select! {
                maybe_message = inbox.recv() => {
                    let Some((repository_id, message)) = maybe_message else { break };
                    let this = self.clone();
                    tokio::spawn(async move { this.dispatch_message(repository_id, message).await });
                }
                maybe_event = runner_events.recv() => {
                    let Some((agent_id, event)) = maybe_event else { continue };
                    let this = self.clone();
                    tokio::spawn(async move { this.dispatch_runner_event(agent_id, event).await });
                }
                _ = ticker.tick() => {
                    self.poll_timers().await;
                }
            }
        }
    }

    async fn dispatch_message(self: Arc<Self>, repository_id: RepositoryId, message: Message) {
        let _guard = self.keyed.lock(&message.session_key).await;
        if let Err(err) = self.handle_message(&repository_id, &message).await {
            tracing::error!(
                session_key = %message.session_key,
                kind = message.body.kind(),
                error = %err,
                "failed to handle tracker message"
            );
        }
    }

    async fn handle_message(&self, repository_id: &RepositoryId, message: &Message) -> Result<(), RuntimeError> {
        self.record_ingress_fact(repository_id, message).await?;
        match &message.body {
            sylas_tracker::translate::MessageBody::SessionStart { .. } => {
                self.handle_session_start(repository_id, message).await
            }
            sylas_tracker::translate::MessageBody::UserPrompt { .. } => {
                self.handle_user_prompt(repository_id, message).await
            }
            sylas_tracker::translate::MessageBody::StopSignal => {
                self.handle_stop(repository_id, message).await
            }
            sylas_tracker::translate::MessageBody::Unassign => {
                self.handle_unassign(repository_id, message).await
            }
            sylas_tracker::translate::MessageBody::ContentUpdate { .. } => {
                self.handle_content_update(repository_id, message).await
            }
        }
    }

    async fn record_ingress_fact(&self, repository_id: &RepositoryId, message: &Message) -> Result<(), RuntimeError> {
        self.apply_effects(vec![Effect::Emit {
            event: Event::TrackerMessageReceived {
                repository_id: repository_id.to_string(),
                external_session_id: message.session_key.clone(),
                kind: message.body.kind().to_string(),
                body: None,
                raw_webhook_id: message.id.clone(),
            },
        }])
        .await?;
        Ok(())
    }

    pub(crate) fn repository(&self, id: &RepositoryId) -> Result<&Repository, RuntimeError> {
        self.repositories
            .get(id)
            .ok_or_else(|| RuntimeError::RepositoryNotFound(id.to_string()))
    }

    /// Run a batch of effects through the executor and append every
    /// resulting event to the WAL, flushing if the WAL's own batching
    /// policy says it's time.
    pub(crate) async fn apply_effects(&self, effects: Vec<Effect>) -> Result<Vec<Event>, RuntimeError> {
        let events = self.executor.execute_all(effects).await?;
        if !events.is_empty() {
            let mut wal = self.wal.lock();
            for event in &events {
                wal.append(event).map_err(|e| RuntimeError::Wal(e.to_string()))?;
            }
            if wal.needs_flush() {
                wal.flush().map_err(|e| RuntimeError::Wal(e.to_string()))?;
            }
        }
        Ok(events)
    }

    async fn poll_timers(&self) {
        let now = self.clock.epoch_ms();
        let fired = self.executor.scheduler().lock().fired_timers(now);
        if fired.is_empty() {
            return;
        }
        for event in fired {
            if let Err(err) = self.handle_timer_fired(event).await {
                tracing::error!(error = %err, "failed to handle fired timer");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> Arc<parking_lot::Mutex<MaterializedState>> {
        self.executor.state()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
