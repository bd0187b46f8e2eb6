use crate::error::{Result, Text2SqlError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

pub type DbPool = PgPool;

/// Introspection issues a handful of catalog queries per process, so the pool
/// stays small.
pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(|e| Text2SqlError::Database(format!("Failed to connect to database: {}", e)))?;
    info!("Connected to PostgreSQL");
    Ok(pool)
}
