//! Schema Catalog
//!
//! Read-only source of table descriptions, DDL text and business rules.
//! Static per-table documents are authoritative:
//!
//! ```text
//! <resources>/schemas/descriptions/<table>.md
//! <resources>/schemas/ddl/<table>.md
//! <config>/business_rules.json
//! ```
//!
//! A live database can additionally be plugged in through
//! [`SchemaIntrospector`]; its table list is cached in a [`TableCache`] on
//! first use for the rest of the process.

use crate::business_rules::{extract_ddl_rules, load_rules_config};
use crate::error::{Result, Text2SqlError};
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub table: String,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub description: String,
}

/// Live schema metadata source (table list with columns and comments).
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>>;
}

/// Populated once, never invalidated while the process runs.
///
/// Two requests racing on first access may both load; the second write
/// replaces the first with an identical value.
#[derive(Default)]
pub struct TableCache {
    tables: RwLock<Option<Arc<Vec<TableDescriptor>>>>,
}

impl TableCache {
    pub async fn get_or_load(&self, introspector: &dyn SchemaIntrospector) -> Result<Arc<Vec<TableDescriptor>>> {
        if let Some(tables) = self.tables.read().await.as_ref() {
            return Ok(Arc::clone(tables));
        }

        let loaded = Arc::new(introspector.list_tables().await?);
        info!("Cached {} tables from database introspection", loaded.len());
        *self.tables.write().await = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    pub async fn is_populated(&self) -> bool {
        self.tables.read().await.is_some()
    }
}

pub struct SchemaCatalog {
    descriptions_dir: PathBuf,
    ddl_dir: PathBuf,
    configured_rules: HashMap<String, Vec<String>>,
    introspector: Option<Arc<dyn SchemaIntrospector>>,
    cache: TableCache,
}

impl SchemaCatalog {
    /// Reads `business_rules.json` now; schema documents are read on demand.
    pub async fn load(resources_dir: impl AsRef<Path>, config_dir: impl AsRef<Path>) -> Result<Self> {
        let schemas = resources_dir.as_ref().join("schemas");
        let configured_rules = load_rules_config(config_dir.as_ref()).await?;
        Ok(Self {
            descriptions_dir: schemas.join("descriptions"),
            ddl_dir: schemas.join("ddl"),
            configured_rules,
            introspector: None,
            cache: TableCache::default(),
        })
    }

    pub fn with_introspector(mut self, introspector: Arc<dyn SchemaIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    /// Summary of every table with a description document, one
    /// `- <table>: <description>` entry each, separated by blank lines.
    pub async fn get_all_tables_info(&self) -> Result<String> {
        let summary = self
            .static_tables()
            .await?
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description).trim().to_string())
            .join("\n\n");
        debug!("Table summary from description documents: {}", summary);
        Ok(summary)
    }

    /// DDL documents of the requested tables, in request order, separated by
    /// blank lines. Tables without a DDL document are skipped.
    pub async fn get_tables_schema(&self, tables: &[String]) -> Result<String> {
        let mut schemas = Vec::with_capacity(tables.len());
        for table in tables {
            match self.ddl_document(table).await? {
                Some(content) => schemas.push(content),
                None => warn!("No DDL document for table '{}', skipping", table),
            }
        }
        Ok(schemas.join("\n\n"))
    }

    /// Business rules for the requested tables, each prefixed with its table
    /// name. Configured rules come first, then the DDL document's rules;
    /// duplicates are dropped. Tables without a DDL document contribute nothing.
    pub async fn get_business_rules(&self, tables: &[String]) -> Result<Vec<String>> {
        let mut rules = Vec::new();
        for table in tables {
            let Some(document) = self.ddl_document(table).await? else {
                warn!("No DDL document for table '{}', skipping its business rules", table);
                continue;
            };
            let configured = self.configured_rules.get(table).into_iter().flatten().cloned();
            rules.extend(
                configured
                    .chain(extract_ddl_rules(&document))
                    .map(|rule| format!("{}: {}", table, rule)),
            );
        }
        Ok(rules.into_iter().unique().collect())
    }

    /// The ```` ```sql ```` block of a table's DDL document.
    pub async fn table_ddl(&self, table: &str) -> Result<Option<String>> {
        let Some(document) = self.ddl_document(table).await? else {
            warn!("No DDL document for table '{}'", table);
            return Ok(None);
        };
        let ddl = document.find("```sql").and_then(|start| {
            let body = &document[start + 6..];
            body.find("```").map(|end| body[..end].trim().to_string())
        });
        Ok(ddl)
    }

    /// Tables whose name or description mentions one of `entities`, or whose
    /// name occurs in the question. Uses the database when an introspector is
    /// configured, the description documents otherwise.
    pub async fn get_relevant_tables(&self, entities: &[String], query_text: &str) -> Result<Vec<TableSummary>> {
        let candidates: Vec<TableSummary> = match &self.introspector {
            Some(introspector) => self
                .cache
                .get_or_load(introspector.as_ref())
                .await?
                .iter()
                .map(|t| TableSummary {
                    name: t.name.clone(),
                    description: t.description.clone(),
                })
                .collect(),
            None => self.static_tables().await?,
        };

        let query = query_text.to_lowercase();
        let entities: Vec<String> = entities.iter().map(|e| e.to_lowercase()).collect();
        Ok(candidates
            .into_iter()
            .filter(|t| {
                let name = t.name.to_lowercase();
                let description = t.description.to_lowercase();
                entities
                    .iter()
                    .any(|e| name.contains(e.as_str()) || description.contains(e.as_str()))
                    || query.contains(&name)
            })
            .collect())
    }

    /// Columns of `tables` whose name parts or comment words appear among the
    /// question's terms. Needs an introspector; without one there is no column
    /// metadata and the result is empty.
    pub async fn get_relevant_fields(&self, tables: &[TableSummary], query_text: &str) -> Result<Vec<ColumnDescriptor>> {
        let Some(introspector) = &self.introspector else {
            debug!("No schema introspector configured, no column metadata available");
            return Ok(Vec::new());
        };
        let cached = self.cache.get_or_load(introspector.as_ref()).await?;
        let query_terms: Vec<String> = query_text.to_lowercase().split_whitespace().map(str::to_string).collect();

        let mut fields = Vec::new();
        for summary in tables {
            let Some(table) = cached.iter().find(|t| t.name == summary.name) else {
                continue;
            };
            fields.extend(
                table
                    .columns
                    .iter()
                    .filter(|c| is_field_relevant(&c.name, c.comment.as_deref(), &query_terms))
                    .cloned(),
            );
        }
        Ok(fields)
    }

    async fn static_tables(&self) -> Result<Vec<TableSummary>> {
        let mut entries = match tokio::fs::read_dir(&self.descriptions_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Text2SqlError::ResourceMissing(format!(
                    "table description directory not found: {}",
                    self.descriptions_dir.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let mut tables = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path).await?;
            // Line 0 is the title, line 1 is blank, line 2 is the description.
            let description = content.lines().nth(2).map(str::trim).unwrap_or("").to_string();
            tables.push(TableSummary { name, description });
        }
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    async fn ddl_document(&self, table: &str) -> Result<Option<String>> {
        if !is_safe_table_name(table) {
            warn!("Rejecting table name '{}' as a document path", table);
            return Ok(None);
        }
        read_optional(&self.ddl_dir.join(format!("{}.md", table))).await
    }
}

/// Table names come from model output; keep them inside the schema directory.
fn is_safe_table_name(table: &str) -> bool {
    !table.is_empty() && !table.contains(['/', '\\']) && !table.contains("..")
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn is_field_relevant(field_name: &str, comment: Option<&str>, query_terms: &[String]) -> bool {
    let field_name = field_name.to_lowercase();
    let comment = comment.unwrap_or("").to_lowercase();
    field_name
        .split('_')
        .chain(comment.split_whitespace())
        .filter(|term| !term.is_empty())
        .any(|term| query_terms.iter().any(|q| q == term))
}
