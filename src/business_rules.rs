//! Business rule sources
//!
//! Rules come from two places: the `business_rules.json` configuration file
//! (table -> rules) and the numbered list under the "Business Rules" heading of
//! a table's DDL document.

use crate::error::{Result, Text2SqlError};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub const RULES_FILE: &str = "business_rules.json";

const RULE_HEADINGS: [&str; 2] = ["## Business Rules", "## 业务规则"];

lazy_static! {
    static ref NUMBERED_ITEM: Regex = Regex::new(r"^\s*\d+\s*[.)、]?\s*").unwrap();
}

/// Load the table -> rules map. A missing file means no configured rules.
pub async fn load_rules_config(config_dir: &Path) -> Result<HashMap<String, Vec<String>>> {
    let path = config_dir.join(RULES_FILE);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No business rule configuration at {}", path.display());
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content)
        .map_err(|e| Text2SqlError::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Numbered items under the business-rules heading of a DDL document, with
/// their numbering stripped. The section ends at the next `## ` heading.
pub fn extract_ddl_rules(document: &str) -> Vec<String> {
    let Some(section) = RULE_HEADINGS
        .iter()
        .find_map(|heading| document.split_once(heading).map(|(_, rest)| rest))
    else {
        return Vec::new();
    };

    section
        .lines()
        .take_while(|line| !line.trim_start().starts_with("## "))
        .map(str::trim)
        .filter(|line| line.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(|line| NUMBERED_ITEM.replace(line, "").trim().to_string())
        .filter(|rule| !rule.is_empty())
        .collect()
}

fn example_rules() -> serde_json::Value {
    serde_json::json!({
        "user": [
            "Email addresses are unique per user",
            "Passwords are stored hashed",
            "User status is one of: active, disabled, pending"
        ],
        "order": [
            "Order status changes are recorded in order history",
            "Order amount is always greater than 0",
            "Completed orders are immutable"
        ],
        "product": [
            "Product price is always greater than 0",
            "Product stock is never negative",
            "Product status is one of: on_sale, off_shelf, out_of_stock"
        ]
    })
}

/// Write the example rule file into `config_dir` unless one already exists.
/// Returns whether a file was written.
pub async fn init_business_rules(config_dir: &Path) -> Result<bool> {
    tokio::fs::create_dir_all(config_dir).await?;
    let path = config_dir.join(RULES_FILE);
    if tokio::fs::try_exists(&path).await? {
        return Ok(false);
    }
    let content = serde_json::to_string_pretty(&example_rules())?;
    tokio::fs::write(&path, content).await?;
    info!("Wrote example business rules to {}", path.display());
    Ok(true)
}
