//! Natural-language question to PostgreSQL translation through a chain of
//! language-model calls grounded in per-table schema documents.

pub mod business_rules;
pub mod catalog;
pub mod config;
pub mod constraint;
pub mod context;
pub mod db;
pub mod entity;
pub mod error;
pub mod factory;
pub mod intent;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod prompt;
pub mod template;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{ColumnDescriptor, SchemaCatalog, SchemaIntrospector, TableDescriptor, TableSummary};
pub use config::{LlmProvider, Settings};
pub use constraint::{ConstraintSet, TableConstraints};
pub use entity::EntitySet;
pub use error::{PipelineError, Result, Text2SqlError};
pub use llm::{LlmBackend, ModelGateway, ResponseContract};
pub use pipeline::{GenerateRequest, GenerationResult, SqlGenerator, Stage};
pub use template::PromptLibrary;
