//! Live schema metadata read from the PostgreSQL catalog.

use crate::catalog::{ColumnDescriptor, SchemaIntrospector, TableDescriptor};
use crate::error::{Result, Text2SqlError};
use async_trait::async_trait;
use itertools::Itertools;
use sqlx::PgPool;
use tracing::debug;

pub struct PgIntrospector {
    pool: PgPool,
    schema: String,
}

impl PgIntrospector {
    pub fn new(pool: PgPool) -> Self {
        Self::with_schema(pool, "public")
    }

    pub fn with_schema(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    async fn load_tables(&self) -> Result<Vec<(String, String)>> {
        sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT c.relname::text, COALESCE(obj_description(c.oid, 'pg_class'), '')::text
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
            ORDER BY c.relname
            "#,
        )
        .bind(self.schema.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Text2SqlError::Database(format!("Failed to load tables: {}", e)))
    }

    async fn load_columns(&self) -> Result<Vec<ColumnDescriptor>> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<String>)>(
            r#"
            SELECT c.relname::text, a.attname::text,
                   format_type(a.atttypid, a.atttypmod)::text,
                   col_description(c.oid, a.attnum)::text
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
              AND a.attnum > 0 AND NOT a.attisdropped
            ORDER BY c.relname, a.attnum
            "#,
        )
        .bind(self.schema.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Text2SqlError::Database(format!("Failed to load columns: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(table, name, data_type, comment)| ColumnDescriptor {
                table,
                name,
                data_type,
                comment,
            })
            .collect())
    }
}

#[async_trait]
impl SchemaIntrospector for PgIntrospector {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        let tables = self.load_tables().await?;
        let mut columns = self.load_columns().await?.into_iter().into_group_map_by(|c| c.table.clone());

        let descriptors: Vec<TableDescriptor> = tables
            .into_iter()
            .map(|(name, description)| TableDescriptor {
                columns: columns.remove(&name).unwrap_or_default(),
                name,
                description,
            })
            .collect();
        debug!("Introspected {} tables in schema '{}'", descriptors.len(), self.schema);
        Ok(descriptors)
    }
}
