// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slack event envelope → [`Message`] translation.
//!
//! Slack mentions are keyed by `channel:thread_ts`; the translator strips
//! the leading `<@BOTID>` mention token from the prompt body before
//! handing it onward.

use serde_json::Value;

use super::{Message, MessageBody, TranslateContext, TranslateError, Translator};

pub struct SlackTranslator;

fn strip_mention(text: &str, bot_user_id: Option<&str>) -> String {
    let trimmed = text.trim_start();
    if let Some(bot) = bot_user_id {
        let marker = format!("<@{bot}>");
        if let Some(rest) = trimmed.strip_prefix(&marker) {
            return rest.trim_start().to_string();
        }
    }
    trimmed.to_string()
}

impl Translator for SlackTranslator {
    fn can_translate(&self, payload: &Value) -> bool {
        let event_type = payload
            .get("event")
            .and_then(|e| e.get("type"))
            .and_then(Value::as_str);
        matches!(event_type, Some("app_mention") | Some("message"))
    }

    fn translate(
        &self,
        payload: &Value,
        ctx: &TranslateContext<'_>,
    ) -> Result<Message, TranslateError> {
        let event = payload.get("event").ok_or_else(|| TranslateError {
            reason: "missing event".into(),
        })?;
        let event_type = event
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TranslateError {
                reason: "missing event.type".into(),
            })?;
        let channel = event
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let ts = event.get("ts").and_then(Value::as_str).unwrap_or("").to_string();
        let thread_ts = event
            .get("thread_ts")
            .and_then(Value::as_str)
            .unwrap_or(ts.as_str())
            .to_string();
        let text = event.get("text").and_then(Value::as_str).unwrap_or("");
        let user = event.get("user").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let session_key = format!("{channel}:{thread_ts}");
        let is_root = thread_ts == ts;

        let body = if event_type == "app_mention" && is_root {
            MessageBody::SessionStart {
                initial_prompt: strip_mention(text, ctx.bot_token),
                labels: Vec::new(),
                issue_id: session_key.clone(),
                issue_identifier: session_key.clone(),
                mention_triggered: true,
            }
        } else {
            MessageBody::UserPrompt {
                text: strip_mention(text, ctx.bot_token),
                author: user,
            }
        };

        Ok(Message {
            id: payload
                .get("event_id")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            source: "slack",
            action: event_type.to_string(),
            received_at_epoch_ms: ctx.received_at_epoch_ms,
            organization_id: ctx.organization_id.to_string(),
            session_key: session_key.clone(),
            work_item_id: session_key.clone(),
            work_item_identifier: session_key,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> TranslateContext<'static> {
        TranslateContext {
            tracker_id: "slack",
            organization_id: "T123",
            bot_token: Some("BOT1"),
            received_at_epoch_ms: 1,
        }
    }

    #[test]
    fn mention_starts_a_session_keyed_by_channel_and_thread() {
        let payload = json!({
            "event_id": "ev-1",
            "event": {
                "type": "app_mention",
                "channel": "C1",
                "ts": "100.1",
                "text": "<@BOT1> fix the bug",
                "user": "U1",
            }
        });
        let msg = SlackTranslator.translate(&payload, &ctx()).unwrap();
        assert_eq!(msg.session_key, "C1:100.1");
        match msg.body {
            MessageBody::SessionStart { initial_prompt, .. } => {
                assert_eq!(initial_prompt, "fix the bug");
            }
            _ => panic!("expected session_start"),
        }
    }

    #[test]
    fn reply_in_thread_is_user_prompt() {
        let payload = json!({
            "event_id": "ev-2",
            "event": {
                "type": "message",
                "channel": "C1",
                "ts": "100.2",
                "thread_ts": "100.1",
                "text": "also add tests",
                "user": "U2",
            }
        });
        let msg = SlackTranslator.translate(&payload, &ctx()).unwrap();
        assert_eq!(msg.session_key, "C1:100.1");
        assert!(matches!(msg.body, MessageBody::UserPrompt { .. }));
    }
}
