use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CliConfig;

/// Thin REST client over the orchestrator's management API. Carries no
/// webhook/matching/session logic of its own — every operation is a single
/// HTTP round trip, matching the teacher's `OrchestratorClient`.
pub struct OrchestratorClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WebhookSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub platform: Value,
    pub delivery_count: u64,
}

impl OrchestratorClient {
    pub fn from_config(config: &CliConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.api_token.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", config.api_token))
                    .context("invalid api_token in config")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.orchestrator_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn list_webhooks(&self) -> Result<Vec<Value>> {
        self.get_json("/api/webhooks").await
    }

    pub async fn get_webhook(&self, id: &str) -> Result<Value> {
        self.get_json(&format!("/api/webhooks/{id}")).await
    }

    pub async fn create_webhook(&self, body: Value) -> Result<Value> {
        self.post_json("/api/webhooks", &body).await
    }

    pub async fn delete_webhook(&self, id: &str) -> Result<()> {
        let url = format!("{}/api/webhooks/{id}", self.base_url);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .context("failed to connect to orchestrator")?;
        if !resp.status().is_success() {
            anyhow::bail!("delete webhook failed: {}", resp.status());
        }
        Ok(())
    }

    pub async fn regenerate_webhook_secret(&self, id: &str) -> Result<Value> {
        self.post_json(&format!("/api/webhooks/{id}/secret"), &Value::Null)
            .await
    }

    pub async fn list_slackbots(&self) -> Result<Vec<Value>> {
        self.get_json("/api/slackbots").await
    }

    pub async fn create_slackbot(&self, body: Value) -> Result<Value> {
        self.post_json("/api/slackbots", &body).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to connect to orchestrator")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("request to {path} failed: {status} {body}");
        }
        resp.json().await.context("failed to parse response body")
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .context("failed to connect to orchestrator")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("request to {path} failed: {status} {text}");
        }
        resp.json().await.context("failed to parse response body")
    }
}
