//! Generative model client.
//!
//! Consumes an Ollama-compatible HTTP API (`/api/generate`, `/api/tags`) as a
//! black box. Calls are bounded by the configured timeout and are never
//! retried: a failed or slow generation degrades at the call site (heuristic
//! classification winner, or a user-visible answer error) rather than being
//! replayed against a stateful pipeline.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::config::LlmConfig;

/// Sampling/output bounds for one generation request.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub context_window: u32,
}

pub struct LlmClient {
    enabled: bool,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            enabled: config.is_enabled(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }

    /// A client whose `generate` always errors. Used when no generative
    /// provider is configured, and in tests.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            model: String::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// One non-streaming generation request. The reqwest timeout doubles as
    /// the caller-imposed bound; there is no retry.
    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        if !self.enabled {
            bail!("Generative model provider is disabled");
        }

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
                "num_ctx": options.context_window,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("generative model request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("generative model error {}: {}", status, body_text);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("invalid generative model response")?;
        Ok(parsed.response.trim().to_string())
    }

    /// Cheap liveness check against the model server.
    pub async fn available(&self) -> bool {
        if !self.enabled {
            return false;
        }
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_client_refuses_to_generate() {
        let llm = LlmClient::disabled();
        let options = GenerateOptions {
            temperature: 0.0,
            max_tokens: 5,
            context_window: 512,
        };
        assert!(llm.generate("hi", &options).await.is_err());
        assert!(!llm.available().await);
    }
}
