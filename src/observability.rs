//! Structured API call records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ApiCallLog {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub function: String,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl ApiCallLog {
    pub fn new(function: impl Into<String>, input: impl Serialize) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
            function: function.into(),
            input: serde_json::to_value(input).unwrap_or(Value::Null),
            output: None,
            error: None,
        }
    }

    pub fn with_output(mut self, output: impl Serialize) -> Self {
        self.output = serde_json::to_value(output).ok();
        self
    }

    pub fn with_error(mut self, error: &dyn std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn emit(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => info!("API call: {}", json),
            Err(e) => error!("Failed to serialise API call log: {}", e),
        }
    }
}

/// Record one call with either its output or its error.
pub fn log_api_call<I, O, E>(function: &str, input: I, outcome: std::result::Result<&O, &E>) -> ApiCallLog
where
    I: Serialize,
    O: Serialize,
    E: std::fmt::Display,
{
    let entry = ApiCallLog::new(function, input);
    let entry = match outcome {
        Ok(output) => entry.with_output(output),
        Err(err) => entry.with_error(err),
    };
    entry.emit();
    entry
}
