use crate::llm::ResponseContract;
use crate::pipeline::Stage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Text2SqlError {
    /// A template or schema document the deployment must ship is absent.
    #[error("Resource missing: {0}")]
    ResourceMissing(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Contract violation in {contract} reply: {detail}")]
    ContractViolation {
        contract: ResponseContract,
        detail: String,
    },

    #[error("Malformed JSON from model: {0}")]
    MalformedJson(String),

    #[error("LLM backend error: {0}")]
    Backend(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Text2SqlError {
    pub fn contract(contract: ResponseContract, detail: impl Into<String>) -> Self {
        Text2SqlError::ContractViolation {
            contract,
            detail: detail.into(),
        }
    }

    /// Only transport failures are worth retrying upstream; everything else
    /// is deterministic for the same input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Text2SqlError::Network(_))
    }
}

/// A stage-local error annotated with the pipeline stage that raised it.
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Text2SqlError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: Text2SqlError) -> Self {
        Self { stage, source }
    }
}

pub type Result<T> = std::result::Result<T, Text2SqlError>;
