// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sylas_core::{AgentId, FakeClock, RepositoryId, WorkspaceId};
use sylas_runners::{FakeRunnerAdapter, RunnerCall, RunnerError, RunnerEvent};
use sylas_storage::MaterializedState;
use sylas_tracker::service::Issue;
use sylas_tracker::service_impl::cli_mock::CliMockTracker;
use sylas_tracker::TrackerService;
use tokio::sync::mpsc;

use super::*;
use crate::workspace::LocalWorkspaceFactory;

fn harness() -> (
    Executor<FakeClock>,
    Arc<FakeRunnerAdapter>,
    mpsc::UnboundedReceiver<(AgentId, RunnerEvent)>,
) {
    let runner = Arc::new(FakeRunnerAdapter::new());
    let mut runners: HashMap<String, Arc<dyn sylas_runners::RunnerAdapter>> = HashMap::new();
    runners.insert("claude".to_string(), runner.clone());

    let (tx, rx) = mpsc::unbounded_channel();
    let executor = Executor::new(
        runners,
        HashMap::new(),
        Arc::new(LocalWorkspaceFactory),
        Arc::new(Mutex::new(MaterializedState::new())),
        Arc::new(Mutex::new(Scheduler::new())),
        FakeClock::new(1_000),
        tx,
    );
    (executor, runner, rx)
}

fn harness_with_tracker(
    repository_id: &str,
    tracker: Arc<CliMockTracker>,
) -> (Executor<FakeClock>, mpsc::UnboundedReceiver<(AgentId, RunnerEvent)>) {
    let mut trackers: HashMap<RepositoryId, Arc<dyn TrackerService>> = HashMap::new();
    trackers.insert(RepositoryId::new(repository_id), tracker);

    let (tx, rx) = mpsc::unbounded_channel();
    let executor = Executor::new(
        HashMap::new(),
        trackers,
        Arc::new(LocalWorkspaceFactory),
        Arc::new(Mutex::new(MaterializedState::new())),
        Arc::new(Mutex::new(Scheduler::new())),
        FakeClock::new(1_000),
        tx,
    );
    (executor, rx)
}

fn session_created_event(id: &str, external_session_id: &str, repository_id: &str) -> Event {
    Event::SessionCreated {
        id: id.to_string(),
        external_session_id: external_session_id.to_string(),
        repository_id: repository_id.to_string(),
        procedure_kind: "orchestrator-full".to_string(),
        procedure_hash: "hash-1".to_string(),
        cwd: std::path::PathBuf::from("/tmp/ws"),
        vars: HashMap::new(),
        initial_subroutine: "triage".to_string(),
        labels: vec![],
        created_at_epoch_ms: 1_000,
    }
}

#[tokio::test]
async fn emit_folds_event_into_shared_state() {
    let (executor, _runner, _rx) = harness();
    let event = session_created_event("sess-1", "ext-1", "repo-1");

    let result = executor.execute(Effect::Emit { event: event.clone() }).await.unwrap();
    assert_eq!(result, Some(event));
    assert!(executor.state().lock().get_session("sess-1").is_some());
}

#[tokio::test]
async fn spawn_runner_non_streaming_uses_start_and_forwards_events() {
    let (executor, runner, mut rx) = harness();
    let agent_id = AgentId::from("agent-1");
    runner.script(
        agent_id.clone(),
        vec![
            RunnerEvent::AssistantDelta("working on it".into()),
            RunnerEvent::Complete { exit_code: Some(0) },
        ],
    );

    let result = executor
        .execute(Effect::SpawnRunner {
            agent_id: agent_id.clone(),
            runner_name: "claude".to_string(),
            session_id: "sess-1".to_string(),
            workspace_path: std::path::PathBuf::from("/tmp/ws"),
            input: "fix the bug".to_string(),
            env: vec![],
            cwd: None,
            streaming: false,
            resume_runner_session_id: None,
            runner_config: HashMap::new(),
        })
        .await
        .unwrap();
    assert_eq!(result, None);

    assert_eq!(runner.calls.lock()[0], RunnerCall::Start(agent_id.clone()));

    let (forwarded_agent, first) = rx.recv().await.unwrap();
    assert_eq!(forwarded_agent, agent_id);
    assert_eq!(first, RunnerEvent::AssistantDelta("working on it".into()));
    let (_, second) = rx.recv().await.unwrap();
    assert_eq!(second, RunnerEvent::Complete { exit_code: Some(0) });
}

#[tokio::test]
async fn spawn_runner_streaming_uses_start_streaming() {
    let (executor, runner, _rx) = harness();
    let agent_id = AgentId::from("agent-2");

    executor
        .execute(Effect::SpawnRunner {
            agent_id: agent_id.clone(),
            runner_name: "claude".to_string(),
            session_id: "sess-1".to_string(),
            workspace_path: std::path::PathBuf::from("/tmp/ws"),
            input: "keep working".to_string(),
            env: vec![],
            cwd: None,
            streaming: true,
            resume_runner_session_id: None,
            runner_config: HashMap::new(),
        })
        .await
        .unwrap();

    assert_eq!(runner.calls.lock()[0], RunnerCall::StartStreaming(agent_id));
}

#[tokio::test]
async fn spawn_runner_propagates_adapter_failure() {
    let (executor, runner, _rx) = harness();
    runner.fail_next_start(RunnerError::SpawnFailed("no credits".into()));

    let result = executor
        .execute(Effect::SpawnRunner {
            agent_id: AgentId::from("agent-3"),
            runner_name: "claude".to_string(),
            session_id: "sess-1".to_string(),
            workspace_path: std::path::PathBuf::from("/tmp/ws"),
            input: "fix".to_string(),
            env: vec![],
            cwd: None,
            streaming: false,
            resume_runner_session_id: None,
            runner_config: HashMap::new(),
        })
        .await;

    assert!(matches!(result, Err(ExecuteError::Runner(RunnerError::SpawnFailed(_)))));
}

#[tokio::test]
async fn spawn_runner_unknown_kind_errors() {
    let (executor, _runner, _rx) = harness();
    let result = executor
        .execute(Effect::SpawnRunner {
            agent_id: AgentId::from("agent-4"),
            runner_name: "gemini".to_string(),
            session_id: "sess-1".to_string(),
            workspace_path: std::path::PathBuf::from("/tmp/ws"),
            input: "fix".to_string(),
            env: vec![],
            cwd: None,
            streaming: false,
            resume_runner_session_id: None,
            runner_config: HashMap::new(),
        })
        .await;
    assert!(matches!(result, Err(ExecuteError::RunnerKindNotFound(name)) if name == "gemini"));
}

#[tokio::test]
async fn send_to_runner_errors_when_agent_has_no_recorded_runner() {
    let (executor, _runner, _rx) = harness();
    let result = executor
        .execute(Effect::SendToRunner {
            agent_id: AgentId::from("agent-unknown"),
            input: "more context".to_string(),
        })
        .await;
    assert!(matches!(result, Err(ExecuteError::RunnerKindNotFound(_))));
}

#[tokio::test]
async fn send_to_runner_routes_to_the_runner_the_agent_was_started_on() {
    let (executor, runner, _rx) = harness();
    let agent_id = AgentId::from("agent-5");

    executor
        .execute(Effect::Emit {
            event: session_created_event("sess-1", "ext-1", "repo-1"),
        })
        .await
        .unwrap();
    executor
        .execute(Effect::Emit {
            event: Event::SubroutineStarted {
                session_id: "sess-1".to_string(),
                subroutine: "implement".to_string(),
                agent_id: Some(agent_id.clone()),
                runner_name: Some("claude".to_string()),
            },
        })
        .await
        .unwrap();

    executor
        .execute(Effect::SendToRunner {
            agent_id: agent_id.clone(),
            input: "one more thing".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(
        runner.calls.lock()[0],
        RunnerCall::AddStreamMessage(agent_id, "one more thing".to_string())
    );
}

#[tokio::test]
async fn stop_runner_silently_noops_when_agent_unknown() {
    let (executor, runner, _rx) = harness();
    executor
        .execute(Effect::StopRunner {
            agent_id: AgentId::from("agent-ghost"),
        })
        .await
        .unwrap();
    assert!(runner.calls.lock().is_empty());
}

#[tokio::test]
async fn stop_runner_invokes_adapter_when_agent_known() {
    let (executor, runner, _rx) = harness();
    let agent_id = AgentId::from("agent-6");
    executor
        .execute(Effect::Emit {
            event: session_created_event("sess-1", "ext-1", "repo-1"),
        })
        .await
        .unwrap();
    executor
        .execute(Effect::Emit {
            event: Event::SubroutineStarted {
                session_id: "sess-1".to_string(),
                subroutine: "implement".to_string(),
                agent_id: Some(agent_id.clone()),
                runner_name: Some("claude".to_string()),
            },
        })
        .await
        .unwrap();

    executor
        .execute(Effect::StopRunner {
            agent_id: agent_id.clone(),
        })
        .await
        .unwrap();

    assert_eq!(runner.calls.lock()[0], RunnerCall::Stop(agent_id));
}

#[tokio::test]
async fn create_workspace_then_delete_workspace_round_trips() {
    let (executor, _runner, _rx) = harness();
    let dir = tempfile::tempdir().unwrap();
    let workspace_id = WorkspaceId::new("ws-1");
    let path = dir.path().join("sess-1");

    let events = executor
        .execute_all(vec![Effect::CreateWorkspace {
            workspace_id: workspace_id.clone(),
            path: path.clone(),
            owner: Some("sess-1".to_string()),
            workspace_type: Some("ephemeral".to_string()),
            repo_root: None,
            branch: None,
            start_point: None,
        }])
        .await
        .unwrap();

    assert_eq!(events, vec![Event::WorkspaceReady { id: workspace_id.clone() }]);
    assert!(path.exists());
    assert_eq!(
        executor.state().lock().get_workspace(&workspace_id).unwrap().status,
        sylas_core::WorkspaceStatus::Ready
    );

    let events = executor
        .execute_all(vec![Effect::DeleteWorkspace {
            workspace_id: workspace_id.clone(),
        }])
        .await
        .unwrap();
    assert_eq!(events, vec![Event::WorkspaceDeleted { id: workspace_id.clone() }]);
    assert!(!path.exists());
    assert!(executor.state().lock().get_workspace(&workspace_id).is_none());
}

#[tokio::test]
async fn delete_workspace_errors_when_not_found() {
    let (executor, _runner, _rx) = harness();
    let result = executor
        .execute(Effect::DeleteWorkspace {
            workspace_id: WorkspaceId::new("ws-missing"),
        })
        .await;
    assert!(matches!(result, Err(ExecuteError::WorkspaceNotFound(_))));
}

#[tokio::test]
async fn set_timer_then_cancel_timer_updates_scheduler() {
    let (executor, _runner, _rx) = harness();
    let timer_id = sylas_core::TimerId::new("gate:sess-1");

    executor
        .execute(Effect::SetTimer {
            id: timer_id.clone(),
            duration: std::time::Duration::from_secs(30),
        })
        .await
        .unwrap();
    assert!(executor.scheduler().lock().has_timers());

    executor.execute(Effect::CancelTimer { id: timer_id }).await.unwrap();
    assert!(!executor.scheduler().lock().has_timers());
}

#[tokio::test]
async fn post_activity_posts_to_tracker_and_records_body_hash() {
    let tracker = Arc::new(CliMockTracker::new());
    tracker.seed_issue(Issue {
        id: "iss-1".into(),
        identifier: "TEST-1".into(),
        title: "Add divide method".into(),
        description: String::new(),
        labels: vec![],
        assignee_id: None,
        team_id: None,
        state_id: None,
    });
    let (executor, _rx) = harness_with_tracker("repo-1", tracker.clone());

    executor
        .execute(Effect::Emit {
            event: session_created_event("sess-1", "mock-session-iss-1", "repo-1"),
        })
        .await
        .unwrap();

    let result = executor
        .execute(Effect::PostActivity {
            session_id: "sess-1".to_string(),
            repository_id: "repo-1".to_string(),
            kind: "response".to_string(),
            body: "all done".to_string(),
            internal: false,
        })
        .await
        .unwrap();

    use sha2::{Digest, Sha256};
    let expected_hash = hex::encode(Sha256::digest(b"all done"));
    assert_eq!(
        result,
        Some(Event::ActivityPosted {
            session_id: "sess-1".to_string(),
            repository_id: "repo-1".to_string(),
            body_hash: expected_hash,
        })
    );

    let activities = tracker.activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].external_session_id, "mock-session-iss-1");
    assert_eq!(activities[0].body, "all done");
}

#[tokio::test]
async fn post_activity_errors_when_session_unknown() {
    let tracker = Arc::new(CliMockTracker::new());
    let (executor, _rx) = harness_with_tracker("repo-1", tracker);

    let result = executor
        .execute(Effect::PostActivity {
            session_id: "sess-missing".to_string(),
            repository_id: "repo-1".to_string(),
            kind: "response".to_string(),
            body: "hello".to_string(),
            internal: false,
        })
        .await;
    assert!(matches!(result, Err(ExecuteError::RepositoryNotFound(_))));
}

#[tokio::test]
async fn post_activity_errors_when_repository_has_no_tracker() {
    let (executor, _runner, _rx) = harness();
    executor
        .execute(Effect::Emit {
            event: session_created_event("sess-1", "ext-1", "repo-1"),
        })
        .await
        .unwrap();

    let result = executor
        .execute(Effect::PostActivity {
            session_id: "sess-1".to_string(),
            repository_id: "repo-1".to_string(),
            kind: "response".to_string(),
            body: "hello".to_string(),
            internal: false,
        })
        .await;
    assert!(matches!(result, Err(ExecuteError::RepositoryNotFound(_))));
}

#[tokio::test]
async fn upload_attachment_refresh_token_and_write_snapshot_are_noop_effects() {
    let (executor, _runner, _rx) = harness();
    let events = executor
        .execute_all(vec![
            Effect::UploadAttachment {
                session_id: "sess-1".to_string(),
                repository_id: "repo-1".to_string(),
                filename: "diff.patch".to_string(),
                content_type: "text/plain".to_string(),
                bytes_len: 128,
            },
            Effect::RefreshToken {
                repository_id: "repo-1".to_string(),
            },
            Effect::WriteSnapshot,
        ])
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn execute_all_collects_only_the_effects_that_produce_events() {
    let (executor, _runner, _rx) = harness();
    let event = session_created_event("sess-1", "ext-1", "repo-1");
    let events = executor
        .execute_all(vec![
            Effect::Emit { event: event.clone() },
            Effect::WriteSnapshot,
            Effect::SetTimer {
                id: sylas_core::TimerId::new("t1"),
                duration: std::time::Duration::from_secs(5),
            },
        ])
        .await
        .unwrap();
    assert_eq!(events, vec![event]);
}
