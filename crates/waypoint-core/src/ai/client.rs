//! Non-streaming completion client
//!
//! Identifier extraction is a single short request, so there is no
//! streaming here: post one Anthropic-format message and collect the text
//! blocks of the reply.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::config::{AiClientConfig, AuthHeader, ANTHROPIC_VERSION};
use super::LanguageModel;

fn collect_anthropic_text(blocks: &[Value]) -> String {
    let mut text = String::new();
    for block in blocks {
        // Some providers return thinking blocks before text blocks.
        if block.get("type").and_then(|t| t.as_str()) != Some("text") {
            continue;
        }
        if let Some(chunk) = block.get("text").and_then(|t| t.as_str()) {
            text.push_str(chunk);
        }
    }
    text
}

/// Client for Anthropic-compatible messages endpoints.
pub struct AnthropicClient {
    http: reqwest::Client,
    config: AiClientConfig,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(config: AiClientConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            config,
            api_key: api_key.into(),
        })
    }

    pub fn config(&self) -> &AiClientConfig {
        &self.config
    }

    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION);

        request = match self.config.auth_header {
            AuthHeader::XApiKey => request.header("x-api-key", &self.api_key),
            AuthHeader::Bearer => request.bearer_auth(&self.api_key),
        };
        request
    }

    async fn handle_error_response(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("HTTP {}: {}", status.as_u16(), body.trim())
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [{
                "role": "user",
                "content": prompt
            }]
        });

        debug!(model = %self.config.model, "Completion request");

        let request = self.build_request(&self.config.api_url());
        let response = request.json(&body).send().await?;
        let response = self.handle_error_response(response).await?;

        let json: Value = response.json().await?;

        let text = json
            .get("content")
            .and_then(|c| c.as_array())
            .map(|arr| collect_anthropic_text(arr))
            .unwrap_or_default();

        Ok(text.trim().to_string())
    }
}
