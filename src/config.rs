//! Runtime settings read from the environment (and `.env`).

use crate::error::{Result, Text2SqlError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Ollama,
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = Text2SqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "openai" => Ok(LlmProvider::OpenAi),
            other => Err(Text2SqlError::Config(format!(
                "unknown LLM_PROVIDER '{}', expected ollama or openai",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: LlmProvider,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub openai_model: String,
    pub resources_dir: PathBuf,
    pub config_dir: PathBuf,
    pub database_url: Option<String>,
    pub llm_timeout: Duration,
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let provider = get("LLM_PROVIDER", "ollama").parse::<LlmProvider>()?;
        let timeout_secs = get("LLM_TIMEOUT_SECS", "60");
        let timeout_secs: u64 = timeout_secs
            .parse()
            .map_err(|_| Text2SqlError::Config(format!("LLM_TIMEOUT_SECS must be a number, got '{}'", timeout_secs)))?;

        Ok(Self {
            provider,
            ollama_base_url: get("OLLAMA_BASE_URL", "http://localhost:11434"),
            ollama_model: get("OLLAMA_MODEL", "qwen2.5"),
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            openai_api_base: get("OPENAI_API_BASE", "https://api.openai.com/v1"),
            openai_model: get("OPENAI_MODEL_NAME", "gpt-4-turbo-preview"),
            resources_dir: PathBuf::from(get("RESOURCES_DIR", "resources")),
            config_dir: PathBuf::from(get("CONFIG_DIR", "config")),
            database_url: lookup("DATABASE_URL").filter(|u| !u.is_empty()),
            llm_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.resources_dir.join("prompts")
    }
}
