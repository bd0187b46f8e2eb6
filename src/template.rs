//! Prompt templates
//!
//! Templates are Markdown files under the prompts directory. A placeholder is
//! an identifier in braces (`{user_query}`); any other brace text, such as a
//! JSON example, is left untouched.

use crate::error::{Result, Text2SqlError};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::debug;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// The four templates the pipeline renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    TableExtraction,
    FieldExtraction,
    ConstraintAnalysis,
    SqlGeneration,
}

impl PromptKind {
    pub fn file_name(self) -> &'static str {
        match self {
            PromptKind::TableExtraction => "table_extraction.md",
            PromptKind::FieldExtraction => "field_extraction.md",
            PromptKind::ConstraintAnalysis => "constraint_analysis.md",
            PromptKind::SqlGeneration => "sql_generation.md",
        }
    }

    /// Placeholders that must appear in the template text.
    pub fn placeholders(self) -> &'static [&'static str] {
        match self {
            PromptKind::TableExtraction => &["available_tables", "user_query"],
            PromptKind::FieldExtraction | PromptKind::ConstraintAnalysis => &["table_schemas", "user_query"],
            PromptKind::SqlGeneration => &[
                "table_ddl",
                "query_fields",
                "constraints",
                "business_rules",
                "user_query",
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    text: String,
}

impl PromptTemplate {
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitute every `(placeholder, value)` pair. Each placeholder must be
    /// present in the template; substituted values are never re-scanned.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String> {
        for (key, _) in values {
            if !self.text.contains(&format!("{{{}}}", key)) {
                return Err(Text2SqlError::Template(format!(
                    "template '{}' is missing placeholder {{{}}}",
                    self.name, key
                )));
            }
        }

        let rendered = PLACEHOLDER.replace_all(&self.text, |caps: &Captures| {
            let key = &caps[1];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(rendered.into_owned())
    }
}

/// Loads templates from a directory on every call, so edits on disk are
/// picked up without a restart.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    dir: PathBuf,
}

impl PromptLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn load(&self, kind: PromptKind) -> Result<PromptTemplate> {
        let path = self.dir.join(kind.file_name());
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Text2SqlError::ResourceMissing(format!(
                    "prompt template not found: {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded template {}: {} chars", kind.file_name(), text.len());
        Ok(PromptTemplate::from_text(kind.file_name(), text.trim()))
    }

    /// Load the template for `kind` and fill its required placeholders.
    pub async fn render(&self, kind: PromptKind, values: &[(&str, &str)]) -> Result<String> {
        let template = self.load(kind).await?;
        for required in kind.placeholders() {
            if !values.iter().any(|(k, _)| k == required) {
                return Err(Text2SqlError::Template(format!(
                    "no value supplied for placeholder {{{}}} of {}",
                    required,
                    kind.file_name()
                )));
            }
        }
        template.render(values)
    }
}
