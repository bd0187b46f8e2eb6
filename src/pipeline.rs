//! Generation Orchestrator
//!
//! Runs one question through entity resolution, constraint resolution,
//! context assembly, prompt construction and SQL generation. The first failing
//! stage ends the run; its error is returned tagged with the stage.

use crate::catalog::SchemaCatalog;
use crate::constraint::{ConstraintResolver, ConstraintSet};
use crate::context::ContextAssembler;
use crate::entity::{EntityResolver, EntitySet};
use crate::error::{PipelineError, Result};
use crate::intent::IntentAnalyzer;
use crate::llm::{ModelGateway, ResponseContract};
use crate::prompt::PromptBuilder;
use crate::template::PromptLibrary;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Intent,
    Entities,
    Constraints,
    Context,
    Prompt,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Intent => "intent analysis",
            Stage::Entities => "entity resolution",
            Stage::Constraints => "constraint resolution",
            Stage::Context => "context assembly",
            Stage::Prompt => "prompt construction",
            Stage::Generation => "sql generation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    IntentAnalyzed,
    EntitiesResolved,
    ConstraintsResolved,
    ContextReady,
    PromptReady,
    SqlReady,
    Failed(Stage, String),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::SqlReady | PipelineState::Failed(..))
    }
}

/// Intake record for one question. `context_id` identifies a conversation
/// and is carried through unused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub text: String,
    #[serde(default)]
    pub context_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub sql: String,
    pub description: Option<String>,
    pub entities: EntitySet,
    pub constraints: ConstraintSet,
}

#[derive(Debug, Deserialize)]
struct SqlReply {
    sql: String,
    description: Option<String>,
}

/// Tracks a single run and tags stage errors.
struct Run {
    state: PipelineState,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PipelineState::Start,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        info!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn check<T>(&mut self, stage: Stage, result: Result<T>) -> std::result::Result<T, PipelineError> {
        result.map_err(|e| {
            error!("{} failed: {}", stage, e);
            self.advance(PipelineState::Failed(stage, e.to_string()));
            PipelineError::new(stage, e)
        })
    }
}

pub struct SqlGenerator {
    gateway: Arc<ModelGateway>,
    intent_analyzer: IntentAnalyzer,
    entity_resolver: EntityResolver,
    constraint_resolver: ConstraintResolver,
    context_assembler: ContextAssembler,
    prompt_builder: PromptBuilder,
}

impl SqlGenerator {
    pub fn new(gateway: Arc<ModelGateway>, catalog: Arc<SchemaCatalog>, prompts: PromptLibrary) -> Self {
        info!("SQL generator ready, prompts from {}", prompts.dir().display());
        Self {
            intent_analyzer: IntentAnalyzer::new(Arc::clone(&gateway)),
            entity_resolver: EntityResolver::new(Arc::clone(&gateway), Arc::clone(&catalog), prompts.clone()),
            constraint_resolver: ConstraintResolver::new(Arc::clone(&gateway), Arc::clone(&catalog), prompts.clone()),
            context_assembler: ContextAssembler::new(Arc::clone(&catalog)),
            prompt_builder: PromptBuilder::new(catalog, prompts),
            gateway,
        }
    }

    pub async fn generate_sql(&self, question: &str) -> std::result::Result<GenerationResult, PipelineError> {
        let mut run = Run::new();
        info!("Generating SQL for: {}", question);

        // Step 1: tables and fields
        let entities = run.check(Stage::Entities, self.entity_resolver.extract_entities(question).await)?;
        run.advance(PipelineState::EntitiesResolved);

        // Step 2: per-table constraints
        let constraints = run.check(
            Stage::Constraints,
            self.constraint_resolver
                .parse_constraints(question, entities.tables())
                .await,
        )?;
        run.advance(PipelineState::ConstraintsResolved);

        // Step 3: business rules
        let context = run.check(
            Stage::Context,
            self.context_assembler.assemble_resolved(entities, constraints).await,
        )?;
        run.advance(PipelineState::ContextReady);

        // Step 4: final prompt
        let prompt = run.check(
            Stage::Prompt,
            self.prompt_builder
                .render(question, &context.entities, &context.constraints, &context.business_rules)
                .await,
        )?;
        run.advance(PipelineState::PromptReady);

        // Step 5: SQL
        let reply = run.check(Stage::Generation, self.generate(&prompt).await)?;
        run.advance(PipelineState::SqlReady);

        info!("Generated SQL: {}", reply.sql);
        Ok(GenerationResult {
            sql: reply.sql,
            description: reply.description,
            entities: context.entities,
            constraints: context.constraints,
        })
    }

    /// Alternative flow: classify the question first, build the context from
    /// catalog lookups, then generate. No constraint resolution call.
    pub async fn generate_with_context(
        &self,
        question: &str,
    ) -> std::result::Result<GenerationResult, PipelineError> {
        let mut run = Run::new();
        info!("Generating SQL with intent context for: {}", question);

        let intent = run.check(Stage::Intent, self.intent_analyzer.analyze(question).await)?;
        run.advance(PipelineState::IntentAnalyzed);

        let context = run.check(Stage::Context, self.context_assembler.assemble(&intent, question).await)?;
        run.advance(PipelineState::ContextReady);

        let entities = context.entities.clone();
        let constraints = context.constraints.clone();
        let prompt = run.check(
            Stage::Prompt,
            self.prompt_builder.render_from_context(question, context).await,
        )?;
        run.advance(PipelineState::PromptReady);

        let reply = run.check(Stage::Generation, self.generate(&prompt).await)?;
        run.advance(PipelineState::SqlReady);

        Ok(GenerationResult {
            sql: reply.sql,
            description: reply.description,
            entities,
            constraints,
        })
    }

    pub async fn handle(&self, request: &GenerateRequest) -> std::result::Result<GenerationResult, PipelineError> {
        if let Some(context_id) = &request.context_id {
            info!("Request carries context id {}", context_id);
        }
        self.generate_sql(&request.text).await
    }

    async fn generate(&self, prompt: &str) -> Result<SqlReply> {
        self.gateway.generate_typed(prompt, ResponseContract::SqlResult).await
    }
}
