//! Context Assembler
//!
//! Gathers everything the final prompt needs into one [`GenerationContext`].
//! Catalog lookups only; no model calls.

use crate::catalog::{ColumnDescriptor, SchemaCatalog, TableSummary};
use crate::constraint::ConstraintSet;
use crate::entity::EntitySet;
use crate::error::Result;
use crate::intent::{Aggregation, Intent, QueryType};
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationContext {
    pub entities: EntitySet,
    pub constraints: ConstraintSet,
    pub business_rules: Vec<String>,
    pub tables: Vec<TableSummary>,
    pub fields: Vec<ColumnDescriptor>,
    pub query_type: QueryType,
    pub time_range: Option<String>,
    pub aggregation: Option<Aggregation>,
}

pub struct ContextAssembler {
    catalog: Arc<SchemaCatalog>,
}

impl ContextAssembler {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }

    /// Context for an analysed intent. Entities are the relevant tables found
    /// for the intent's business entities, with their relevant fields; no
    /// constraints have been resolved on this path.
    pub async fn assemble(&self, intent: &Intent, question: &str) -> Result<GenerationContext> {
        let tables = self.catalog.get_relevant_tables(&intent.entities, question).await?;
        let fields = self.catalog.get_relevant_fields(&tables, question).await?;
        let business_rules = self.catalog.get_business_rules(&intent.entities).await?;

        let by_table: BTreeMap<String, Vec<String>> = fields
            .iter()
            .map(|f| (f.table.clone(), f.name.clone()))
            .into_group_map()
            .into_iter()
            .collect();
        let entities = EntitySet::new(tables.iter().map(|t| t.name.clone()).collect(), by_table);

        debug!(
            "Assembled context: {} tables, {} fields, {} rules",
            tables.len(),
            fields.len(),
            business_rules.len()
        );
        Ok(GenerationContext {
            entities,
            constraints: ConstraintSet::default(),
            business_rules,
            tables,
            fields,
            query_type: intent.query_type,
            time_range: intent.time_range.clone(),
            aggregation: intent.aggregation,
        })
    }

    /// Context for entities and constraints already resolved by the model.
    /// Only business rules are read, from the static documents; the database
    /// is never consulted. The statement kind is taken to be SELECT.
    pub async fn assemble_resolved(
        &self,
        entities: EntitySet,
        constraints: ConstraintSet,
    ) -> Result<GenerationContext> {
        let business_rules = self.catalog.get_business_rules(entities.tables()).await?;

        debug!(
            "Assembled context for resolved entities: {} tables, {} rules",
            entities.tables().len(),
            business_rules.len()
        );
        Ok(GenerationContext {
            entities,
            constraints,
            business_rules,
            tables: Vec::new(),
            fields: Vec::new(),
            query_type: QueryType::Select,
            time_range: None,
            aggregation: None,
        })
    }
}
