// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `session_start` handling: label-override and AI classification both run
//! here before the first subroutine's runner spawns.

use std::collections::HashMap;

use sylas_core::{AgentId, Clock, Effect, Event, IdGen, RepositoryId, Repository, TimerId, WorkspaceId};
use sylas_tracker::service::{ActivityKind, CreateActivity};
use sylas_tracker::translate::{Message, MessageBody};

use crate::error::RuntimeError;
use crate::procedure::classifier::Classifier;
use crate::procedure::{label_to_procedure, ProcedureTable};
use crate::workspace::workspace_path;

use super::{build_runner_config, select_runner_kind, Manager, LIVENESS_INTERVAL};

/// Fallback procedure when classification itself fails outright (spawn
/// error, timeout, unrecognised label). Matches [`Classifier::classify`]'s
/// documented failure contract.
const CLASSIFIER_FALLBACK_PROCEDURE: &str = "full-development";

impl<C, G> Manager<C, G>
where
    C: Clock + Clone + Send + Sync + 'static,
    G: IdGen + 'static,
{
    pub(super) async fn handle_session_start(
        &self,
        repository_id: &RepositoryId,
        message: &Message,
    ) -> Result<(), RuntimeError> {
        let MessageBody::SessionStart {
            initial_prompt,
            labels,
            issue_id,
            issue_identifier,
            mention_triggered: _,
        } = &message.body
        else {
            unreachable!("dispatch only routes SessionStart bodies here");
        };

        let repo = self.repository(repository_id)?;
        if !repo.active {
            tracing::info!(repository_id = %repository_id, "ignoring session_start on an inactive repository");
            return Ok(());
        }
        if self
            .executor
            .state()
            .lock()
            .session_for_external_id(&message.session_key)
            .is_some()
        {
            // A webhook retry for a session we already created. Idempotent no-op.
            return Ok(());
        }

        let now = self.clock.epoch_ms();
        let session_id = format!("sess-{}", self.ids.next());
        let workspace_id = WorkspaceId::new(format!("ws-{session_id}"));
        let workspace_path = workspace_path(repo.workspace_base.as_deref(), &repo.repo_path, &session_id);

        let procedure_name = self.resolve_procedure(repo, labels, initial_prompt).await;
        let procedures = ProcedureTable::embedded();
        let initial_subroutine = procedures
            .initial_subroutine(&procedure_name)
            .map_err(|_| RuntimeError::UnknownProcedure(procedure_name.clone()))?
            .to_string();

        let runner_name = select_runner_kind(repo, labels, initial_prompt, &self.runners);
        let agent_id = AgentId::new(format!("agent-{}", self.ids.next()));

        let mut vars = HashMap::new();
        vars.insert("issue_id".to_string(), issue_id.clone());
        vars.insert("issue_identifier".to_string(), issue_identifier.clone());

        let spec = procedures.spec(&initial_subroutine);
        let effects = vec![
            Effect::CreateWorkspace {
                workspace_id,
                path: workspace_path.clone(),
                owner: Some(session_id.clone()),
                workspace_type: None,
                repo_root: Some(repo.repo_path.clone()),
                branch: Some(repo.base_branch.clone()),
                start_point: None,
            },
            Effect::Emit {
                event: Event::SessionCreated {
                    id: session_id.clone(),
                    external_session_id: message.session_key.clone(),
                    repository_id: repository_id.to_string(),
                    procedure_kind: procedure_name.clone(),
                    procedure_hash: procedures.hash(),
                    cwd: workspace_path.clone(),
                    vars,
                    initial_subroutine: initial_subroutine.clone(),
                    labels: labels.clone(),
                    created_at_epoch_ms: now,
                },
            },
            Effect::Emit {
                event: Event::SubroutineStarted {
                    session_id: session_id.clone(),
                    subroutine: initial_subroutine.clone(),
                    agent_id: Some(agent_id.clone()),
                    runner_name: Some(runner_name.clone()),
                },
            },
            Effect::SpawnRunner {
                agent_id,
                runner_name,
                session_id: session_id.clone(),
                workspace_path,
                input: initial_prompt.clone(),
                env: repo.env.clone().into_iter().collect(),
                cwd: None,
                streaming: !spec.single_turn,
                resume_runner_session_id: None,
                runner_config: build_runner_config(repo, &spec),
            },
            Effect::SetTimer {
                id: TimerId::liveness(&session_id),
                duration: LIVENESS_INTERVAL,
            },
        ];

        self.apply_effects(effects).await?;

        if let Some(tracker) = self.trackers.get(repository_id) {
            let _ = tracker
                .create_agent_activity(CreateActivity {
                    external_session_id: &message.session_key,
                    kind: ActivityKind::ProcedureSelection,
                    body: &format!("Routing to the `{procedure_name}` procedure."),
                })
                .await;
        }

        Ok(())
    }

    /// Resolve which procedure a new (or re-classified) session runs:
    /// configured label override first, then a one-shot classifier turn,
    /// falling back to `full-development` if classification itself fails.
    pub(super) async fn resolve_procedure(&self, repo: &Repository, labels: &[String], request_text: &str) -> String {
        if let Some(procedure) = repo.procedure_for_labels(labels) {
            tracing::info!(
                procedure = %procedure,
                labels = ?labels,
                "using label override procedure, skipping AI routing"
            );
            return procedure;
        }

        let Some(runner) = self.runners.get(&self.classifier_runner) else {
            tracing::warn!(
                runner = %self.classifier_runner,
                "classifier runner not configured, falling back to repository default"
            );
            return repo.default_procedure.clone();
        };

        let classifier = Classifier::new(runner.clone(), repo.repo_path.clone());
        match classifier.classify(request_text).await {
            Ok(label) => label_to_procedure(&label)
                .unwrap_or(CLASSIFIER_FALLBACK_PROCEDURE)
                .to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "classification failed, falling back");
                CLASSIFIER_FALLBACK_PROCEDURE.to_string()
            }
        }
    }
}
