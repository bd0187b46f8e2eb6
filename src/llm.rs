//! Model Gateway
//!
//! Wraps a prompt in the JSON-only instruction envelope, sends it to the
//! configured backend, strips any code fence from the reply, parses it and
//! checks it against the caller's [`ResponseContract`].

pub mod backend;
pub mod contract;

pub use backend::{LlmBackend, OllamaBackend, OpenAiBackend};
pub use contract::{extract_json, ResponseContract};

use crate::error::{Result, Text2SqlError};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error, info};

const JSON_ENVELOPE: &str = "You are a PostgreSQL expert working inside a text-to-SQL pipeline.

{task}

Respond with a single JSON value only. Do not add explanations, comments or any text outside the JSON.";

pub struct ModelGateway {
    backend: Arc<dyn LlmBackend>,
}

impl ModelGateway {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        info!("Model gateway using backend '{}'", backend.name());
        Self { backend }
    }

    /// Run one model call and return the validated JSON payload text.
    pub async fn generate(&self, prompt: &str, contract: ResponseContract) -> Result<String> {
        let wrapped = JSON_ENVELOPE.replace("{task}", prompt);
        debug!("Model call for {} ({} chars)", contract, wrapped.len());

        let raw = self.backend.complete(&wrapped).await.map_err(|e| {
            error!("LLM generation failed for {}: {}", contract, e);
            e
        })?;

        let payload = extract_json(&raw);
        let value: serde_json::Value = serde_json::from_str(payload).map_err(|e| {
            error!("Reply for {} is not valid JSON: {}", contract, raw);
            Text2SqlError::MalformedJson(format!("{} reply: {}. Payload: {}", contract, e, payload))
        })?;

        contract.validate(&value)?;
        debug!("Reply for {} passed validation: {}", contract, payload);
        Ok(payload.to_string())
    }

    /// Like [`generate`](Self::generate), then deserialize the payload into `T`.
    pub async fn generate_typed<T: DeserializeOwned>(
        &self,
        prompt: &str,
        contract: ResponseContract,
    ) -> Result<T> {
        let payload = self.generate(prompt, contract).await?;
        serde_json::from_str(&payload).map_err(|e| Text2SqlError::contract(contract, e.to_string()))
    }
}
