// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sylasd` — the Sylas edge worker daemon.
//!
//! Loads `config.json`, replays persisted state, wires the tracker
//! services/runner adapters/workspace factory into the session lifecycle
//! manager (`sylas-engine`), and serves the tracker-facing HTTP ingress
//! (`sylas-tracker::ingress`) until a signal asks it to stop.

mod config;
mod lock;
mod wiring;

use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use reqwest::Client;
use sylas_core::{SystemClock, UuidIdGen};
use sylas_engine::{Manager, ManagerDeps};
use sylas_storage::{load_snapshot, Checkpointer, MaterializedState, Wal};
use sylas_tracker::ingress::{IngressState, RepoRoute};
use sylas_tracker::refresh::RefreshCoordinator;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use crate::config::{sylas_home, EnvConfig, FileConfig};

/// How long shutdown waits for runners to confirm they stopped before
/// giving up and marking sessions `ended` anyway.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(20);

/// How often `MaterializedState` is checkpointed to disk in the steady
/// state, independent of the shutdown-time checkpoint.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let home = sylas_home();
    std::fs::create_dir_all(&home)?;
    let _lock = lock::acquire(&home.join("daemon.lock"))?;

    let config_path = home.join("config.json");
    let file_config = FileConfig::load(&config_path).unwrap_or_else(|err| {
        warn!(error = %err, "no usable config.json, starting with zero repositories");
        FileConfig::default()
    });
    let env_config = EnvConfig::from_env();

    let wal_path = home.join("wal").join("events.wal");
    let snapshot_path = home.join("state.json");

    let snapshot = load_snapshot(&snapshot_path)?;
    let (processed_seq, initial_state) = match snapshot {
        Some(s) => (s.seq, s.state),
        None => (0, MaterializedState::new()),
    };
    let mut wal = Wal::open(&wal_path, processed_seq)?;
    let mut state = initial_state;
    while let Some(entry) = wal.next_unprocessed()? {
        state.apply_event(&entry.event);
        wal.mark_processed(entry.seq);
    }
    info!(sessions = state.sessions.len(), "replayed persisted state");

    let http_client = Client::builder().build()?;
    let refresh = Arc::new(RefreshCoordinator::new());
    let credentials_path = config_path.clone();

    let repositories = wiring::build_repositories(&file_config);
    let routes: Vec<RepoRoute> = wiring::build_routes(&file_config);
    let trackers = wiring::build_trackers(&file_config, &http_client, &refresh, credentials_path);
    let runners = wiring::build_runners();
    let workspaces = wiring::workspace_factory();

    let deps = ManagerDeps {
        runners,
        trackers,
        workspaces,
        repositories,
        wal: Arc::new(parking_lot::Mutex::new(wal)),
        initial_state: state,
        clock: SystemClock,
        ids: UuidIdGen,
        classifier_runner: file_config.classifier_runner.clone(),
    };

    let (manager, runner_event_rx) = Manager::new(deps);
    let (manager, sink) = manager.spawn(runner_event_rx);

    let running_manager = manager.clone();
    let ingress_state = Arc::new(IngressState::new(
        routes,
        wiring::slack_verification(&env_config),
        sink,
        Arc::new(move || running_manager.has_running_sessions()),
    ));
    let app = sylas_tracker::ingress::router(ingress_state);

    let addr = format!("{}:{}", env_config.bind_host(), env_config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "sylasd listening");

    let checkpoint_manager = manager.clone();
    let checkpointer = Checkpointer::new(snapshot_path.clone());
    tokio::spawn(periodic_checkpoint(checkpoint_manager, checkpointer));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, stopping sessions");
    manager.shutdown(SHUTDOWN_DEADLINE).await;

    let final_checkpointer = Checkpointer::new(snapshot_path);
    let final_state = manager.state_snapshot();
    if let Err(err) = final_checkpointer.checkpoint_sync(final_state.0, &final_state.1) {
        error!(error = %err, "final checkpoint failed");
    }

    Ok(())
}

async fn periodic_checkpoint<C, G>(manager: Arc<Manager<C, G>>, checkpointer: Checkpointer)
where
    C: sylas_core::Clock + Clone + Send + Sync + 'static,
    G: sylas_core::IdGen + 'static,
{
    let mut ticker = tokio::time::interval(CHECKPOINT_INTERVAL);
    loop {
        ticker.tick().await;
        let (seq, state) = manager.state_snapshot();
        let handle = checkpointer.start(seq, &state);
        if let Err(err) = handle.wait() {
            warn!(error = %err, "periodic checkpoint failed");
        }
    }
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = ctrl_c => {}
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}
