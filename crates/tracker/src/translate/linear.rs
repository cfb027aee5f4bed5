// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Linear webhook → [`Message`] translation.
//!
//! Linear's `AgentSessionEvent` webhook carries `{type, action, agentSession,
//! ...}`; `AppUserNotification` carries issue updates. Only a small closed
//! set of `(type, action)` combinations is recognised — everything else is
//! a translate failure.

use serde_json::Value;

use super::{
    Message, MessageBody, TranslateContext, TranslateError, Translator, AGENT_SESSION_MARKER,
};

pub struct LinearTranslator;

fn str_field<'a>(v: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = v;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

impl Translator for LinearTranslator {
    fn can_translate(&self, payload: &Value) -> bool {
        matches!(
            (
                payload.get("type").and_then(Value::as_str),
                payload.get("action").and_then(Value::as_str),
            ),
            (Some("AgentSessionEvent"), Some("created"))
                | (Some("AgentSessionEvent"), Some("prompted"))
                | (Some("AppUserNotification"), Some("issueUnassignedFromYou"))
                | (Some("AgentSessionEvent"), Some("stopped"))
                | (Some("Issue"), Some("update"))
        )
    }

    fn translate(
        &self,
        payload: &Value,
        ctx: &TranslateContext<'_>,
    ) -> Result<Message, TranslateError> {
        let typ = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TranslateError {
                reason: "missing type".into(),
            })?;
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| TranslateError {
                reason: "missing action".into(),
            })?;

        let webhook_id = payload
            .get("webhookId")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        match (typ, action) {
            ("AgentSessionEvent", "created") => {
                let session = payload.get("agentSession").ok_or_else(|| TranslateError {
                    reason: "missing agentSession".into(),
                })?;
                let issue_id = str_field(session, &["issue", "id"])
                    .ok_or_else(|| TranslateError {
                        reason: "missing agentSession.issue.id".into(),
                    })?
                    .to_string();
                let issue_identifier =
                    str_field(session, &["issue", "identifier"]).unwrap_or("").to_string();
                let prompt_body = str_field(session, &["comment", "body"]).unwrap_or("");
                let labels = session
                    .get("issue")
                    .and_then(|i| i.get("labels"))
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|l| l.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let session_id = str_field(session, &["id"])
                    .ok_or_else(|| TranslateError {
                        reason: "missing agentSession.id".into(),
                    })?
                    .to_string();

                Ok(Message {
                    id: webhook_id,
                    source: "linear",
                    action: action.to_string(),
                    received_at_epoch_ms: ctx.received_at_epoch_ms,
                    organization_id: ctx.organization_id.to_string(),
                    session_key: session_id,
                    work_item_id: issue_id.clone(),
                    work_item_identifier: issue_identifier.clone(),
                    body: MessageBody::SessionStart {
                        initial_prompt: prompt_body.to_string(),
                        labels,
                        issue_id,
                        issue_identifier,
                        mention_triggered: !prompt_body.contains(AGENT_SESSION_MARKER),
                    },
                })
            }
            ("AgentSessionEvent", "prompted") => {
                let session = payload.get("agentSession").ok_or_else(|| TranslateError {
                    reason: "missing agentSession".into(),
                })?;
                let session_id = str_field(session, &["id"])
                    .ok_or_else(|| TranslateError {
                        reason: "missing agentSession.id".into(),
                    })?
                    .to_string();
                let issue_id = str_field(session, &["issue", "id"]).unwrap_or("").to_string();
                let issue_identifier =
                    str_field(session, &["issue", "identifier"]).unwrap_or("").to_string();
                let text = str_field(payload, &["agentActivity", "body"])
                    .unwrap_or("")
                    .to_string();
                let author = str_field(payload, &["agentActivity", "authorName"])
                    .unwrap_or("unknown")
                    .to_string();

                Ok(Message {
                    id: webhook_id,
                    source: "linear",
                    action: action.to_string(),
                    received_at_epoch_ms: ctx.received_at_epoch_ms,
                    organization_id: ctx.organization_id.to_string(),
                    session_key: session_id,
                    work_item_id: issue_id,
                    work_item_identifier: issue_identifier,
                    body: MessageBody::UserPrompt { text, author },
                })
            }
            ("AgentSessionEvent", "stopped") => {
                let session = payload.get("agentSession").ok_or_else(|| TranslateError {
                    reason: "missing agentSession".into(),
                })?;
                let session_id = str_field(session, &["id"])
                    .ok_or_else(|| TranslateError {
                        reason: "missing agentSession.id".into(),
                    })?
                    .to_string();
                let issue_id = str_field(session, &["issue", "id"]).unwrap_or("").to_string();
                let issue_identifier =
                    str_field(session, &["issue", "identifier"]).unwrap_or("").to_string();
                Ok(Message {
                    id: webhook_id,
                    source: "linear",
                    action: action.to_string(),
                    received_at_epoch_ms: ctx.received_at_epoch_ms,
                    organization_id: ctx.organization_id.to_string(),
                    session_key: session_id,
                    work_item_id: issue_id,
                    work_item_identifier: issue_identifier,
                    body: MessageBody::StopSignal,
                })
            }
            ("AppUserNotification", "issueUnassignedFromYou") => {
                let issue_id = str_field(payload, &["notification", "issue", "id"])
                    .unwrap_or("")
                    .to_string();
                let issue_identifier =
                    str_field(payload, &["notification", "issue", "identifier"])
                        .unwrap_or("")
                        .to_string();
                Ok(Message {
                    id: webhook_id,
                    source: "linear",
                    action: action.to_string(),
                    received_at_epoch_ms: ctx.received_at_epoch_ms,
                    organization_id: ctx.organization_id.to_string(),
                    session_key: issue_id.clone(),
                    work_item_id: issue_id,
                    work_item_identifier: issue_identifier,
                    body: MessageBody::Unassign,
                })
            }
            ("Issue", "update") => {
                let issue_id = str_field(payload, &["data", "id"]).unwrap_or("").to_string();
                let issue_identifier =
                    str_field(payload, &["data", "identifier"]).unwrap_or("").to_string();
                let before_title =
                    str_field(payload, &["updatedFrom", "title"]).unwrap_or("").to_string();
                let after_title = str_field(payload, &["data", "title"]).unwrap_or("").to_string();
                let before_description = str_field(payload, &["updatedFrom", "description"])
                    .unwrap_or("")
                    .to_string();
                let after_description =
                    str_field(payload, &["data", "description"]).unwrap_or("").to_string();
                let mut changed = Vec::new();
                if before_title != after_title {
                    changed.push("title".to_string());
                }
                if before_description != after_description {
                    changed.push("description".to_string());
                }
                Ok(Message {
                    id: webhook_id,
                    source: "linear",
                    action: action.to_string(),
                    received_at_epoch_ms: ctx.received_at_epoch_ms,
                    organization_id: ctx.organization_id.to_string(),
                    session_key: issue_id.clone(),
                    work_item_id: issue_id,
                    work_item_identifier: issue_identifier,
                    body: MessageBody::ContentUpdate {
                        before_title,
                        after_title,
                        before_description,
                        after_description,
                        changed,
                    },
                })
            }
            (t, a) => Err(TranslateError {
                reason: format!("unrecognised webhook type/action: {t}/{a}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> TranslateContext<'static> {
        TranslateContext {
            tracker_id: "linear",
            organization_id: "org-1",
            bot_token: None,
            received_at_epoch_ms: 1000,
        }
    }

    #[test]
    fn translates_session_start_with_mention_triggered_true() {
        let payload = json!({
            "type": "AgentSessionEvent",
            "action": "created",
            "webhookId": "wh-1",
            "agentSession": {
                "id": "sess-1",
                "comment": {"body": "please fix the bug"},
                "issue": {"id": "iss-1", "identifier": "TEST-1", "labels": ["bug"]},
            }
        });
        let msg = LinearTranslator.translate(&payload, &ctx()).unwrap();
        assert_eq!(msg.session_key, "sess-1");
        match msg.body {
            MessageBody::SessionStart {
                mention_triggered, ..
            } => assert!(mention_triggered),
            _ => panic!("wrong message kind"),
        }
    }

    #[test]
    fn marker_in_comment_means_not_mention_triggered() {
        let payload = json!({
            "type": "AgentSessionEvent",
            "action": "created",
            "webhookId": "wh-2",
            "agentSession": {
                "id": "sess-2",
                "comment": {"body": format!("{} do the thing", AGENT_SESSION_MARKER)},
                "issue": {"id": "iss-2", "identifier": "TEST-2"},
            }
        });
        let msg = LinearTranslator.translate(&payload, &ctx()).unwrap();
        match msg.body {
            MessageBody::SessionStart {
                mention_triggered, ..
            } => assert!(!mention_triggered),
            _ => panic!("wrong message kind"),
        }
    }

    #[test]
    fn unknown_type_action_is_translate_error_not_panic() {
        let payload = json!({"type": "Whatever", "action": "nonsense"});
        let err = LinearTranslator.translate(&payload, &ctx()).unwrap_err();
        assert!(err.reason.contains("unrecognised"));
        assert!(!LinearTranslator.can_translate(&payload));
    }
}
