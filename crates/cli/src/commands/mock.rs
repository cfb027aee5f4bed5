// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the same `{type, action, ...}` shapes Linear's real webhooks send,
//! so `sylas mock` can drive a daemon configured with a `cli-mock` (or even
//! a `proxy`-authenticated `linear`) repository end to end.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;

use crate::client::DaemonClient;

#[derive(Args)]
pub struct MockArgs {
    #[command(subcommand)]
    command: MockCommand,
}

#[derive(Subcommand)]
enum MockCommand {
    /// Simulate an issue being assigned to the agent (AgentSessionEvent/created)
    SessionStart {
        /// Linear organization id the repository's route is configured for
        #[arg(long, default_value = "org-1")]
        org: String,
        /// Linear issue id
        #[arg(long, default_value_t = random_id("iss"))]
        issue_id: String,
        /// Human-readable issue identifier, e.g. ENG-123
        #[arg(long, default_value = "MOCK-1")]
        identifier: String,
        /// Agent session id Linear would have assigned
        #[arg(long, default_value_t = random_id("sess"))]
        session_id: String,
        /// Initial comment body the session starts from
        #[arg(long, default_value = "Please take a look at this.")]
        prompt: String,
        /// Comma-separated issue labels
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
        /// Bearer token, if the repository is configured with webhookAuthMode: proxy
        #[arg(long)]
        token: Option<String>,
    },
    /// Simulate a follow-up comment on an existing session (AgentSessionEvent/prompted)
    Prompt {
        #[arg(long, default_value = "org-1")]
        org: String,
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "mock-user")]
        author: String,
        #[arg(long)]
        token: Option<String>,
    },
    /// Simulate the session being stopped (AgentSessionEvent/stopped)
    Stop {
        #[arg(long, default_value = "org-1")]
        org: String,
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        token: Option<String>,
    },
}

fn random_id(prefix: &str) -> String {
    format!("{prefix}-{}", &uuid::Uuid::new_v4().to_string()[..8])
}

pub async fn run(client: &DaemonClient, args: MockArgs) -> Result<()> {
    let (token, payload) = match args.command {
        MockCommand::SessionStart {
            org,
            issue_id,
            identifier,
            session_id,
            prompt,
            labels,
            token,
        } => (
            token,
            json!({
                "type": "AgentSessionEvent",
                "action": "created",
                "organizationId": org,
                "webhookId": random_id("wh"),
                "agentSession": {
                    "id": session_id,
                    "comment": { "body": prompt },
                    "issue": { "id": issue_id, "identifier": identifier, "labels": labels },
                }
            }),
        ),
        MockCommand::Prompt {
            org,
            session_id,
            text,
            author,
            token,
        } => (
            token,
            json!({
                "type": "AgentSessionEvent",
                "action": "prompted",
                "organizationId": org,
                "webhookId": random_id("wh"),
                "agentSession": { "id": session_id },
                "agentActivity": { "body": text, "authorName": author },
            }),
        ),
        MockCommand::Stop { org, session_id, token } => (
            token,
            json!({
                "type": "AgentSessionEvent",
                "action": "stopped",
                "organizationId": org,
                "webhookId": random_id("wh"),
                "agentSession": { "id": session_id },
            }),
        ),
    };

    let resp = client.webhook(payload, token.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}
