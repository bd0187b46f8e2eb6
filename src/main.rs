use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use text2sql::business_rules::init_business_rules;
use text2sql::config::{LlmProvider, Settings};
use text2sql::factory::{create_catalog, create_services};
use text2sql::observability::log_api_call;
use text2sql::GenerateRequest;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(about = "Translate natural-language questions into PostgreSQL queries")]
struct Args {
    /// Schema documents and prompt templates (or set RESOURCES_DIR)
    #[arg(long, global = true)]
    resources_dir: Option<PathBuf>,

    /// Directory holding business_rules.json (or set CONFIG_DIR)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// ollama or openai (or set LLM_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model name for the selected provider
    #[arg(long, global = true)]
    model: Option<String>,

    /// PostgreSQL URL for live schema introspection (or set DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate SQL for a question
    Generate {
        question: String,

        /// Conversation identifier, carried with the request
        #[arg(long)]
        context_id: Option<String>,

        /// Classify the question first and build the prompt from catalog context
        #[arg(long)]
        with_intent: bool,
    },
    /// Print the table summary shown to the model
    Tables,
    /// Print business rules for the given tables
    Rules { tables: Vec<String> },
    /// Write an example business_rules.json if none exists
    InitRules,
}

fn apply_overrides(settings: &mut Settings, args: &Args) -> Result<()> {
    if let Some(dir) = &args.resources_dir {
        settings.resources_dir = dir.clone();
    }
    if let Some(dir) = &args.config_dir {
        settings.config_dir = dir.clone();
    }
    if let Some(provider) = &args.provider {
        settings.provider = provider.parse::<LlmProvider>()?;
    }
    if let Some(model) = &args.model {
        match settings.provider {
            LlmProvider::Ollama => settings.ollama_model = model.clone(),
            LlmProvider::OpenAi => settings.openai_model = model.clone(),
        }
    }
    if let Some(url) = &args.database_url {
        settings.database_url = Some(url.clone());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut settings = Settings::from_env()?;
    apply_overrides(&mut settings, &args)?;

    match args.command {
        Command::Generate {
            question,
            context_id,
            with_intent,
        } => {
            let services = create_services(&settings).await?;
            let request = GenerateRequest {
                text: question,
                context_id,
            };
            info!("Received question: {}", request.text);

            let result = if with_intent {
                services.generator.generate_with_context(&request.text).await
            } else {
                services.generator.handle(&request).await
            };
            log_api_call("generate_sql", &request, result.as_ref());

            let result = result?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Tables => {
            let catalog = create_catalog(&settings).await?;
            println!("{}", catalog.get_all_tables_info().await?);
        }
        Command::Rules { tables } => {
            let catalog = create_catalog(&settings).await?;
            for rule in catalog.get_business_rules(&tables).await? {
                println!("{}", rule);
            }
        }
        Command::InitRules => {
            if init_business_rules(&settings.config_dir).await? {
                println!("Wrote example rules to {}", settings.config_dir.display());
            } else {
                println!("Business rules already present in {}", settings.config_dir.display());
            }
        }
    }

    Ok(())
}
