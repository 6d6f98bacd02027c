//! Text-completion collaborator
//!
//! The pipeline treats the language model as a black box behind
//! `CompletionService`. `OllamaCompletionClient` talks to an Ollama server:
//! - Endpoint: POST /api/generate
//! - Non-streaming (`stream: false`); the caller owns the timeout

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::errors::{ChatError, Result};
use crate::types::ExpertRole;

/// One expert prompt ready to send
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub role: ExpertRole,
    /// Role template, sent as the system prompt
    pub system: String,
    pub prompt: String,
}

/// Black-box text completion
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Ollama generate client
#[derive(Debug, Clone)]
pub struct OllamaCompletionClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaCompletionClient {
    /// Create client with custom configuration
    pub fn with_config(config: &CompletionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(ChatError::HttpError)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionService for OllamaCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: &request.system,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::CompletionError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatError::CompletionError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| ChatError::CompletionError(format!("Failed to parse response: {}", e)))?;

        Ok(parsed.response)
    }
}
