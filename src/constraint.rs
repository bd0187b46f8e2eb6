//! Constraint Resolver
//!
//! One model call derives per-table query constraints (filters, grouping,
//! ordering, limit). The model may leave keys out; they are filled with
//! defaults here so every table in a [`ConstraintSet`] carries all five.

use crate::catalog::SchemaCatalog;
use crate::error::Result;
use crate::llm::{ModelGateway, ResponseContract};
use crate::template::{PromptKind, PromptLibrary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The only keys a constraint record may carry.
pub const CONSTRAINT_KEYS: [&str; 5] = ["where", "group_by", "having", "order_by", "limit"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConstraints {
    #[serde(rename = "where")]
    pub where_clauses: Vec<String>,
    pub group_by: Vec<String>,
    pub having: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
}

impl TableConstraints {
    pub fn is_empty(&self) -> bool {
        self.where_clauses.is_empty()
            && self.group_by.is_empty()
            && self.having.is_empty()
            && self.order_by.is_empty()
            && self.limit.is_none()
    }
}

/// A constraint record as the model returned it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialTableConstraints {
    #[serde(rename = "where")]
    pub where_clauses: Option<Vec<String>>,
    pub group_by: Option<Vec<String>>,
    pub having: Option<Vec<String>>,
    pub order_by: Option<Vec<String>>,
    pub limit: Option<u64>,
}

impl PartialTableConstraints {
    pub fn normalize(self) -> TableConstraints {
        TableConstraints {
            where_clauses: self.where_clauses.unwrap_or_default(),
            group_by: self.group_by.unwrap_or_default(),
            having: self.having.unwrap_or_default(),
            order_by: self.order_by.unwrap_or_default(),
            limit: self.limit,
        }
    }
}

/// Table name -> constraints, ordered by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintSet(BTreeMap<String, TableConstraints>);

impl ConstraintSet {
    pub fn from_partial(partial: BTreeMap<String, PartialTableConstraints>) -> Self {
        Self(
            partial
                .into_iter()
                .map(|(table, record)| (table, record.normalize()))
                .collect(),
        )
    }

    pub fn get(&self, table: &str) -> Option<&TableConstraints> {
        self.0.get(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TableConstraints)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct ConstraintResolver {
    gateway: Arc<ModelGateway>,
    catalog: Arc<SchemaCatalog>,
    prompts: PromptLibrary,
}

impl ConstraintResolver {
    pub fn new(gateway: Arc<ModelGateway>, catalog: Arc<SchemaCatalog>, prompts: PromptLibrary) -> Self {
        Self {
            gateway,
            catalog,
            prompts,
        }
    }

    pub async fn parse_constraints(&self, question: &str, tables: &[String]) -> Result<ConstraintSet> {
        let table_schemas = self.catalog.get_tables_schema(tables).await?;
        let prompt = self
            .prompts
            .render(
                PromptKind::ConstraintAnalysis,
                &[("table_schemas", &table_schemas), ("user_query", question)],
            )
            .await?;

        let partial: BTreeMap<String, PartialTableConstraints> = self
            .gateway
            .generate_typed(&prompt, ResponseContract::ConstraintMap)
            .await?;
        let constraints = ConstraintSet::from_partial(partial);

        info!("Resolved constraints for {} tables", constraints.len());
        debug!("Constraints: {:?}", constraints);
        Ok(constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Text2SqlError;
    use crate::test_support::{fixture, shipped_prompts_dir, Fixture, ScriptedBackend};
    use serde_json::{json, Map, Value};

    fn sample_value(key: &str) -> Value {
        match key {
            "limit" => json!(5),
            other => json!([format!("{} clause", other)]),
        }
    }

    #[test]
    fn test_normalize_fills_every_missing_key() {
        for mask in 0u32..32 {
            let mut record = Map::new();
            for (bit, key) in CONSTRAINT_KEYS.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    record.insert(key.to_string(), sample_value(key));
                }
            }
            let partial: PartialTableConstraints = serde_json::from_value(Value::Object(record.clone())).unwrap();
            let normalized = serde_json::to_value(partial.normalize()).unwrap();
            let normalized = normalized.as_object().unwrap();

            assert_eq!(normalized.len(), CONSTRAINT_KEYS.len(), "mask {mask:05b}");
            for key in CONSTRAINT_KEYS {
                let expected = match record.get(key) {
                    Some(v) => v.clone(),
                    None if key == "limit" => Value::Null,
                    None => json!([]),
                };
                assert_eq!(normalized[key], expected, "mask {mask:05b}, key {key}");
            }
        }
    }

    #[test]
    fn test_unknown_key_rejected_by_partial_record() {
        assert!(serde_json::from_value::<PartialTableConstraints>(json!({"select": []})).is_err());
    }

    #[test]
    fn test_empty_constraints() {
        assert!(TableConstraints::default().is_empty());
        let limited = TableConstraints {
            limit: Some(1),
            ..Default::default()
        };
        assert!(!limited.is_empty());
    }

    async fn resolver(fx: &Fixture, backend: Arc<ScriptedBackend>) -> ConstraintResolver {
        let catalog = Arc::new(fx.catalog().await);
        ConstraintResolver::new(
            Arc::new(ModelGateway::new(backend)),
            catalog,
            PromptLibrary::new(shipped_prompts_dir()),
        )
    }

    #[tokio::test]
    async fn test_parse_constraints_normalizes_reply() {
        let backend = Arc::new(ScriptedBackend::new([
            r#"{"order": {"where": ["amount > 100"], "order_by": ["amount DESC"], "limit": 10}, "user": {}}"#,
        ]));
        let fx = fixture();
        let resolver = resolver(&fx, backend.clone()).await;

        let constraints = resolver
            .parse_constraints("Top ten orders above 100", &["order".to_string(), "user".to_string()])
            .await
            .unwrap();

        let order = constraints.get("order").unwrap();
        assert_eq!(order.where_clauses, vec!["amount > 100".to_string()]);
        assert_eq!(order.order_by, vec!["amount DESC".to_string()]);
        assert!(order.group_by.is_empty());
        assert!(order.having.is_empty());
        assert_eq!(order.limit, Some(10));
        assert!(constraints.get("user").unwrap().is_empty());

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Top ten orders above 100"));
        assert!(prompts[0].contains("CREATE TABLE \"order\""));
    }

    #[tokio::test]
    async fn test_parse_constraints_rejects_unknown_key() {
        let backend = Arc::new(ScriptedBackend::new([r#"{"user": {"select": ["*"]}}"#]));
        let fx = fixture();
        let err = resolver(&fx, backend)
            .await
            .parse_constraints("all users", &["user".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Text2SqlError::ContractViolation {
                contract: ResponseContract::ConstraintMap,
                ..
            }
        ));
    }
}
