// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP client over a running `sylasd`'s ingress surface.

use anyhow::{Context, Result};
use serde_json::Value;

pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn status(&self) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .with_context(|| format!("failed to reach sylasd at {}", self.base_url))?;
        resp.json().await.context("sylasd returned invalid JSON from /status")
    }

    /// POST a webhook body to `/webhook`, optionally bearer-authenticated to
    /// satisfy a repository configured with `webhookAuthMode: proxy`.
    pub async fn webhook(&self, body: Value, bearer_token: Option<&str>) -> Result<Value> {
        let mut req = self.http.post(format!("{}/webhook", self.base_url)).json(&body);
        if let Some(token) = bearer_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("failed to reach sylasd at {}", self.base_url))?;
        let status = resp.status();
        let value: Value = resp.json().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("sylasd rejected webhook ({status}): {value}");
        }
        Ok(value)
    }
}
