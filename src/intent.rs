//! Intent Analyzer
//!
//! Classifies a question (statement kind, business entities, time range,
//! aggregation) with a single model call. The reply has no fixed contract;
//! it is checked while converting into [`Intent`].

use crate::error::{Result, Text2SqlError};
use crate::llm::{ModelGateway, ResponseContract};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SELECT" => Ok(QueryType::Select),
            "INSERT" => Ok(QueryType::Insert),
            "UPDATE" => Ok(QueryType::Update),
            "DELETE" => Ok(QueryType::Delete),
            other => Err(format!("unknown query type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregation::Count => "count",
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
        };
        f.write_str(s)
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "count" => Ok(Aggregation::Count),
            "sum" => Ok(Aggregation::Sum),
            "avg" => Ok(Aggregation::Avg),
            other => Err(format!("unknown aggregation '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intent {
    pub query_type: QueryType,
    pub entities: Vec<String>,
    pub time_range: Option<String>,
    pub aggregation: Option<Aggregation>,
}

#[derive(Debug, Deserialize)]
struct RawIntent {
    query_type: String,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    time_range: Option<String>,
    #[serde(default)]
    aggregation: Option<String>,
}

/// Models answer "null" as often as they answer null.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

impl TryFrom<RawIntent> for Intent {
    type Error = Text2SqlError;

    fn try_from(raw: RawIntent) -> Result<Self> {
        let violation = |detail: String| Text2SqlError::contract(ResponseContract::Untyped, detail);
        let query_type = raw.query_type.parse::<QueryType>().map_err(violation)?;
        let aggregation = present(raw.aggregation)
            .map(|a| a.parse::<Aggregation>())
            .transpose()
            .map_err(violation)?;
        Ok(Intent {
            query_type,
            entities: raw.entities,
            time_range: present(raw.time_range),
            aggregation,
        })
    }
}

fn intent_prompt(question: &str) -> String {
    format!(
        r#"Analyse the intent of the following question.

Question: {question}

Identify:
1. The statement kind (SELECT/INSERT/UPDATE/DELETE)
2. The main business entities involved
3. The time range, if any
4. The aggregation, if any

Reply in this format:
{{
    "query_type": "SELECT/INSERT/UPDATE/DELETE",
    "entities": ["entity1", "entity2"],
    "time_range": "last_30_days/specific_date/null",
    "aggregation": "count/sum/avg/null"
}}"#
    )
}

pub struct IntentAnalyzer {
    gateway: Arc<ModelGateway>,
}

impl IntentAnalyzer {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn analyze(&self, question: &str) -> Result<Intent> {
        let raw: RawIntent = self
            .gateway
            .generate_typed(&intent_prompt(question), ResponseContract::Untyped)
            .await?;
        let intent = Intent::try_from(raw)?;
        info!(
            "Intent: {} over {:?}, time range {:?}, aggregation {:?}",
            intent.query_type, intent.entities, intent.time_range, intent.aggregation
        );
        Ok(intent)
    }
}
