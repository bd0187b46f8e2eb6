//! Builds the shared components once per process.

use crate::catalog::SchemaCatalog;
use crate::config::{LlmProvider, Settings};
use crate::db::{init_pool, PgIntrospector};
use crate::error::{Result, Text2SqlError};
use crate::llm::{LlmBackend, ModelGateway, OllamaBackend, OpenAiBackend};
use crate::pipeline::SqlGenerator;
use crate::template::PromptLibrary;
use std::sync::Arc;
use tracing::info;

pub struct Services {
    pub generator: SqlGenerator,
    pub catalog: Arc<SchemaCatalog>,
}

pub fn create_backend(settings: &Settings) -> Result<Arc<dyn LlmBackend>> {
    let backend: Arc<dyn LlmBackend> = match settings.provider {
        LlmProvider::Ollama => Arc::new(OllamaBackend::new(
            &settings.ollama_base_url,
            &settings.ollama_model,
            settings.llm_timeout,
        )?),
        LlmProvider::OpenAi => {
            let api_key = settings.openai_api_key.clone().ok_or_else(|| {
                Text2SqlError::Config("OPENAI_API_KEY is required when LLM_PROVIDER=openai".to_string())
            })?;
            Arc::new(OpenAiBackend::new(
                api_key,
                &settings.openai_api_base,
                &settings.openai_model,
                settings.llm_timeout,
            )?)
        }
    };
    Ok(backend)
}

/// Catalog over the configured resources, with live introspection when a
/// database URL is set.
pub async fn create_catalog(settings: &Settings) -> Result<SchemaCatalog> {
    let catalog = SchemaCatalog::load(&settings.resources_dir, &settings.config_dir).await?;
    match &settings.database_url {
        Some(url) => {
            let pool = init_pool(url).await?;
            info!("Schema introspection enabled");
            Ok(catalog.with_introspector(Arc::new(PgIntrospector::new(pool))))
        }
        None => Ok(catalog),
    }
}

pub async fn create_services(settings: &Settings) -> Result<Services> {
    let backend = create_backend(settings)?;
    let catalog = Arc::new(create_catalog(settings).await?);
    let gateway = Arc::new(ModelGateway::new(backend));
    let generator = SqlGenerator::new(gateway, Arc::clone(&catalog), PromptLibrary::new(settings.prompts_dir()));
    info!("Services created");
    Ok(Services { generator, catalog })
}
