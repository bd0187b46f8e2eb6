//! Entity Resolver
//!
//! Two model calls: which tables a question touches, then which fields of
//! those tables it needs.

use crate::catalog::SchemaCatalog;
use crate::error::Result;
use crate::llm::{ModelGateway, ResponseContract};
use crate::template::{PromptKind, PromptLibrary};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Tables and per-table fields referenced by a question.
///
/// Every key of `fields` is one of `tables`, deserialized input included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EntitySetParts")]
pub struct EntitySet {
    tables: Vec<String>,
    fields: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct EntitySetParts {
    tables: Vec<String>,
    #[serde(default)]
    fields: BTreeMap<String, Vec<String>>,
}

impl From<EntitySetParts> for EntitySet {
    fn from(parts: EntitySetParts) -> Self {
        EntitySet::new(parts.tables, parts.fields)
    }
}

impl EntitySet {
    /// Duplicate tables keep their first position; field entries for tables
    /// outside `tables` are dropped.
    pub fn new(tables: Vec<String>, fields: BTreeMap<String, Vec<String>>) -> Self {
        let tables: Vec<String> = tables.into_iter().unique().collect();
        let fields = fields
            .into_iter()
            .filter(|(table, _)| {
                let known = tables.contains(table);
                if !known {
                    warn!("Dropping fields for table '{}' which was not extracted", table);
                }
                known
            })
            .collect();
        Self { tables, fields }
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    /// `table.field` pairs in table order.
    pub fn qualified_fields(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter_map(|table| self.fields.get(table).map(|fields| (table, fields)))
            .flat_map(|(table, fields)| fields.iter().map(move |field| format!("{}.{}", table, field)))
            .collect()
    }
}

pub struct EntityResolver {
    gateway: Arc<ModelGateway>,
    catalog: Arc<SchemaCatalog>,
    prompts: PromptLibrary,
}

impl EntityResolver {
    pub fn new(gateway: Arc<ModelGateway>, catalog: Arc<SchemaCatalog>, prompts: PromptLibrary) -> Self {
        Self {
            gateway,
            catalog,
            prompts,
        }
    }

    pub async fn extract_entities(&self, question: &str) -> Result<EntitySet> {
        let tables = self.extract_tables(question).await?;
        let fields = self.extract_fields(question, &tables).await?;
        let entities = EntitySet::new(tables, fields);
        info!(
            "Extracted tables {:?} with {} fields",
            entities.tables(),
            entities.qualified_fields().len()
        );
        Ok(entities)
    }

    async fn extract_tables(&self, question: &str) -> Result<Vec<String>> {
        let available_tables = self.catalog.get_all_tables_info().await?;
        let prompt = self
            .prompts
            .render(
                PromptKind::TableExtraction,
                &[("available_tables", &available_tables), ("user_query", question)],
            )
            .await?;
        self.gateway.generate_typed(&prompt, ResponseContract::TableList).await
    }

    async fn extract_fields(&self, question: &str, tables: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
        let table_schemas = self.catalog.get_tables_schema(tables).await?;
        let prompt = self
            .prompts
            .render(
                PromptKind::FieldExtraction,
                &[("table_schemas", &table_schemas), ("user_query", question)],
            )
            .await?;
        self.gateway.generate_typed(&prompt, ResponseContract::FieldMap).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Text2SqlError;
    use crate::test_support::{fixture, shipped_prompts_dir, Fixture, ScriptedBackend};

    async fn resolver(fx: &Fixture, backend: Arc<ScriptedBackend>) -> EntityResolver {
        EntityResolver::new(
            Arc::new(ModelGateway::new(backend)),
            Arc::new(fx.catalog().await),
            PromptLibrary::new(shipped_prompts_dir()),
        )
    }

    #[test]
    fn test_entity_set_invariants() {
        let mut fields = BTreeMap::new();
        fields.insert("user".to_string(), vec!["name".to_string(), "email".to_string()]);
        fields.insert("invoice".to_string(), vec!["total".to_string()]);

        let set = EntitySet::new(
            vec!["user".to_string(), "order".to_string(), "user".to_string()],
            fields,
        );
        assert_eq!(set.tables(), &["user".to_string(), "order".to_string()]);
        assert!(!set.fields().contains_key("invoice"));
        assert_eq!(set.qualified_fields(), vec!["user.name".to_string(), "user.email".to_string()]);
    }

    #[test]
    fn test_deserialized_entity_set_keeps_invariants() {
        let set: EntitySet = serde_json::from_str(
            r#"{"tables": ["user", "user"], "fields": {"user": ["name"], "invoice": ["total"]}}"#,
        )
        .unwrap();
        assert_eq!(set.tables(), &["user".to_string()]);
        assert_eq!(set.fields().keys().collect::<Vec<_>>(), vec!["user"]);

        let tables_only: EntitySet = serde_json::from_str(r#"{"tables": ["order"]}"#).unwrap();
        assert!(tables_only.fields().is_empty());
    }

    #[tokio::test]
    async fn test_extract_entities() {
        let backend = Arc::new(ScriptedBackend::new([
            r#"["user"]"#,
            "```json\n{\"user\": [\"姓名\", \"邮箱\"]}\n```",
        ]));
        let fx = fixture();
        let entities = resolver(&fx, backend.clone())
            .await
            .extract_entities("查询所有用户的姓名和邮箱")
            .await
            .unwrap();

        assert_eq!(entities.tables(), &["user".to_string()]);
        assert_eq!(entities.fields()["user"], vec!["姓名".to_string(), "邮箱".to_string()]);

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("- user: Registered platform users"));
        assert!(prompts[1].contains("CREATE TABLE \"user\""));
        assert!(!prompts[1].contains("CREATE TABLE \"order\""));
    }

    #[tokio::test]
    async fn test_field_reply_with_wrong_shape() {
        let backend = Arc::new(ScriptedBackend::new([r#"["user"]"#, r#"{"user": "name"}"#]));
        let fx = fixture();
        let err = resolver(&fx, backend)
            .await
            .extract_entities("user names")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Text2SqlError::ContractViolation {
                contract: ResponseContract::FieldMap,
                ..
            }
        ));
    }
}
