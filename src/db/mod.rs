//! PostgreSQL connectivity and live schema introspection.

pub mod connection;
pub mod introspect;

pub use connection::{init_pool, DbPool};
pub use introspect::PgIntrospector;
