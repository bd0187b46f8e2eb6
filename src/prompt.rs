//! Prompt Builder
//!
//! Fills the `sql_generation` template from resolved entities, constraints and
//! business rules, or from an assembled [`GenerationContext`].

use crate::catalog::SchemaCatalog;
use crate::constraint::{ConstraintSet, TableConstraints};
use crate::context::GenerationContext;
use crate::entity::EntitySet;
use crate::error::Result;
use crate::template::{PromptKind, PromptLibrary};
use itertools::Itertools;
use std::sync::Arc;
use tracing::debug;

pub struct PromptBuilder {
    catalog: Arc<SchemaCatalog>,
    prompts: PromptLibrary,
}

impl PromptBuilder {
    pub fn new(catalog: Arc<SchemaCatalog>, prompts: PromptLibrary) -> Self {
        Self { catalog, prompts }
    }

    pub async fn render(
        &self,
        question: &str,
        entities: &EntitySet,
        constraints: &ConstraintSet,
        business_rules: &[String],
    ) -> Result<String> {
        let table_ddl = self.collect_ddl(entities.tables()).await?;
        let query_fields = entities.qualified_fields().join("\n");
        let constraints = format_constraints(constraints);
        let business_rules = business_rules.join("\n");

        self.fill(question, &table_ddl, &query_fields, &constraints, &business_rules)
            .await
    }

    pub async fn render_from_context(&self, question: &str, context: GenerationContext) -> Result<String> {
        let mut table_ddl = self.collect_ddl(context.entities.tables()).await?;
        if !context.tables.is_empty() {
            let summaries = context
                .tables
                .iter()
                .map(|t| format!("- {}: {}", t.name, t.description))
                .join("\n");
            table_ddl = [table_ddl, summaries].iter().filter(|s| !s.is_empty()).join("\n\n");
        }

        let query_fields = context
            .entities
            .qualified_fields()
            .into_iter()
            .chain(context.fields.iter().map(|f| match &f.comment {
                Some(comment) => format!("- {}.{} ({}): {}", f.table, f.name, f.data_type, comment),
                None => format!("- {}.{} ({})", f.table, f.name, f.data_type),
            }))
            .join("\n");

        let classification = format!(
            "Query type: {}\nTime range: {}\nAggregation: {}",
            context.query_type,
            context.time_range.as_deref().unwrap_or("none"),
            context
                .aggregation
                .map(|a| a.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        let constraints = [format_constraints(&context.constraints), classification]
            .iter()
            .filter(|s| !s.is_empty())
            .join("\n\n");

        let business_rules = context.business_rules.iter().map(|r| format!("- {}", r)).join("\n");

        self.fill(question, &table_ddl, &query_fields, &constraints, &business_rules)
            .await
    }

    async fn collect_ddl(&self, tables: &[String]) -> Result<String> {
        let mut blocks = Vec::new();
        for table in tables {
            if let Some(ddl) = self.catalog.table_ddl(table).await? {
                blocks.push(ddl);
            }
        }
        Ok(blocks.join("\n\n"))
    }

    async fn fill(
        &self,
        question: &str,
        table_ddl: &str,
        query_fields: &str,
        constraints: &str,
        business_rules: &str,
    ) -> Result<String> {
        let prompt = self
            .prompts
            .render(
                PromptKind::SqlGeneration,
                &[
                    ("table_ddl", table_ddl),
                    ("query_fields", query_fields),
                    ("constraints", constraints),
                    ("business_rules", business_rules),
                    ("user_query", question),
                ],
            )
            .await?;
        debug!("SQL generation prompt:\n{}", prompt);
        Ok(prompt)
    }
}

/// One `Table <t> constraints:` block per table that has any constraint.
pub fn format_constraints(constraints: &ConstraintSet) -> String {
    constraints
        .iter()
        .filter(|(_, c)| !c.is_empty())
        .map(|(table, c)| {
            std::iter::once(format!("Table {} constraints:", table))
                .chain(constraint_lines(c).into_iter().map(|line| format!("  - {}", line)))
                .join("\n")
        })
        .join("\n")
}

fn constraint_lines(c: &TableConstraints) -> Vec<String> {
    let mut lines = Vec::new();
    for (label, clauses) in [
        ("WHERE", &c.where_clauses),
        ("GROUP BY", &c.group_by),
        ("HAVING", &c.having),
        ("ORDER BY", &c.order_by),
    ] {
        if !clauses.is_empty() {
            lines.push(format!("{}: {}", label, clauses.join(", ")));
        }
    }
    if let Some(limit) = c.limit {
        lines.push(format!("LIMIT: {}", limit));
    }
    lines
}
