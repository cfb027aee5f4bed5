// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Which runner kind a new subroutine invocation spawns on.
//!
//! Priority, highest first: an explicit `[agent=X]` tag in the issue
//! description/prompt text, then an explicit `[model=X]` tag in that same
//! text (runner inferred from the model name), then a label matching a
//! known agent name, then a label matching a known model name, then
//! whichever runner the repository is already configured with a default
//! model for, then `claude`, then whatever's configured at all. A tag,
//! label, or model that names a runner kind this deployment has no adapter
//! for is skipped rather than failing the session.

use std::collections::HashMap;
use std::sync::Arc;

use sylas_core::Repository;
use sylas_runners::RunnerAdapter;

use crate::procedure::SubroutineSpec;

const KNOWN_AGENTS: [&str; 5] = ["claude", "gemini", "codex", "cursor", "opencode"];

pub(crate) fn select_runner_kind(
    repo: &Repository,
    labels: &[String],
    description: &str,
    runners: &HashMap<String, Arc<dyn RunnerAdapter>>,
) -> String {
    if let Some(kind) = extract_tag(description, "agent") {
        if runners.contains_key(kind.as_str()) {
            return kind;
        }
    }

    if let Some(model) = extract_tag(description, "model") {
        if let Some(kind) = runner_kind_for_model(&model) {
            if runners.contains_key(kind) {
                return kind.to_string();
            }
        }
    }

    for label in labels {
        let lower = label.to_lowercase();
        if KNOWN_AGENTS.contains(&lower.as_str()) && runners.contains_key(lower.as_str()) {
            return lower;
        }
    }

    for label in labels {
        let lower = label.to_lowercase();
        if let Some(kind) = runner_kind_for_model(&lower) {
            if runners.contains_key(kind) {
                return kind.to_string();
            }
        }
    }

    if repo.claude_default_model.is_some() && runners.contains_key("claude") {
        return "claude".to_string();
    }
    if repo.gemini_default_model.is_some() && runners.contains_key("gemini") {
        return "gemini".to_string();
    }
    if repo.codex_default_model.is_some() && runners.contains_key("codex") {
        return "codex".to_string();
    }

    if runners.contains_key("claude") {
        return "claude".to_string();
    }

    runners.keys().next().cloned().unwrap_or_else(|| "claude".to_string())
}

/// Pulls the value out of a `[tag=value]` marker, case-insensitively.
/// Returns `None` if the text carries no such marker.
fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let marker = format!("[{tag}=");
    let start = lower.find(&marker)? + marker.len();
    let end = lower[start..].find(']')? + start;
    let value = lower[start..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn runner_kind_for_model(model: &str) -> Option<&'static str> {
    if model.contains("claude") {
        Some("claude")
    } else if model.contains("gemini") {
        Some("gemini")
    } else if model.contains("gpt") || model.contains("codex") || model.contains("o1") || model.contains("o3") {
        Some("codex")
    } else if model.contains("cursor") {
        Some("cursor")
    } else if model.contains("opencode") {
        Some("opencode")
    } else {
        None
    }
}

/// Tool allow/deny list for a `RunnerSpawnConfig::runner_config`, derived
/// from the repository's configured defaults and the subroutine's own
/// `disallow_all_tools` flag (a no-tool subroutine denies every tool
/// regardless of the repository's configured allow list).
pub(crate) fn build_runner_config(
    repo: &Repository,
    spec: &SubroutineSpec,
) -> HashMap<String, serde_json::Value> {
    let mut config = HashMap::new();
    if spec.disallow_all_tools {
        config.insert("allowed_tools".to_string(), serde_json::json!([]));
    } else if !repo.allowed_tools.is_empty() {
        config.insert("allowed_tools".to_string(), serde_json::json!(repo.allowed_tools));
    }
    if !repo.disallowed_tools.is_empty() {
        config.insert("disallowed_tools".to_string(), serde_json::json!(repo.disallowed_tools));
    }
    config
}

#[cfg(test)]
#[path = "runner_select_tests.rs"]
mod tests;
