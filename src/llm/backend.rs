//! LLM backends
//!
//! A backend turns one prompt into one completion string. It knows nothing
//! about JSON contracts; it only distinguishes transport failures, backend
//! faults and successful (possibly empty) completions.

use crate::error::{Result, Text2SqlError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Backend name for logs (e.g. "ollama", "openai")
    fn name(&self) -> &str;

    /// Send the prompt and return the generated text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Text2SqlError::Config(format!("Failed to build HTTP client: {}", e)))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Ollama `/api/generate` backend (non-streaming).
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Sending request to Ollama API, prompt length: {}", prompt.len());
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Network error calling Ollama API: {}", e);
                Text2SqlError::Network(format!("Ollama API call failed: {}", e))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Text2SqlError::Network(format!("Failed to read Ollama API response: {}", e)))?;

        if !status.is_success() {
            error!("Ollama API returned status {}: {}", status, text);
            return Err(Text2SqlError::Backend(format!("Ollama API error ({}): {}", status, text)));
        }

        let parsed: OllamaGenerateResponse = serde_json::from_str(&text).map_err(|e| {
            Text2SqlError::Backend(format!(
                "Failed to parse Ollama API response: {}. Body: {}",
                e,
                truncate(&text, 200)
            ))
        })?;

        if let Some(err) = parsed.error {
            error!("Ollama API returned error payload: {}", err);
            return Err(Text2SqlError::Backend(format!("Ollama API error: {}", err)));
        }

        parsed.response.ok_or_else(|| {
            Text2SqlError::Backend(format!(
                "Invalid response format from Ollama API: {}",
                truncate(&text, 200)
            ))
        })
    }
}

/// OpenAI-compatible `/chat/completions` backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "Return JSON only, no text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Text2SqlError::Network(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Text2SqlError::Backend(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Text2SqlError::Backend(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(Text2SqlError::Backend(format!("LLM API error: {}", error)));
        }

        let choice = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| Text2SqlError::Backend(format!("No choices in LLM response: {}", response_json)))?;

        match choice.get("finish_reason").and_then(|r| r.as_str()) {
            Some("length") => warn!("LLM response was truncated due to length limit"),
            Some("content_filter") => {
                return Err(Text2SqlError::Backend(
                    "LLM response was filtered by content policy".to_string(),
                ))
            }
            _ => {}
        }

        choice["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Text2SqlError::Backend(format!("No content in LLM response: {}", response_json)))
    }
}
