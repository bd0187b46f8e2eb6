//! Response contracts
//!
//! Every Model Gateway call names the JSON shape it expects back. The gateway
//! checks the parsed reply against that shape before handing it to the caller,
//! so a mis-shaped model answer never travels further down the pipeline.

use crate::constraint::CONSTRAINT_KEYS;
use crate::error::{Result, Text2SqlError};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Expected reply shape for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseContract {
    /// `["table_a", "table_b"]`
    TableList,
    /// `{"table_a": ["field", ...]}`
    FieldMap,
    /// `{"table_a": {"where": [...], "group_by": [...], "having": [...], "order_by": [...], "limit": 10}}`
    ConstraintMap,
    /// `{"sql": "...", "description": "..."}`
    SqlResult,
    /// No shape check; accepted as-is.
    Untyped,
}

impl fmt::Display for ResponseContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseContract::TableList => "table extraction",
            ResponseContract::FieldMap => "field extraction",
            ResponseContract::ConstraintMap => "constraint analysis",
            ResponseContract::SqlResult => "sql generation",
            ResponseContract::Untyped => "untyped",
        };
        f.write_str(name)
    }
}

impl ResponseContract {
    pub fn validate(self, value: &Value) -> Result<()> {
        match self {
            ResponseContract::TableList => self.expect_string_array(value, "reply"),
            ResponseContract::FieldMap => self.validate_field_map(value),
            ResponseContract::ConstraintMap => self.validate_constraint_map(value),
            ResponseContract::SqlResult => self.validate_sql_result(value),
            ResponseContract::Untyped => {
                warn!("No response contract for this call, accepting reply without validation");
                Ok(())
            }
        }
    }

    fn violation(self, detail: impl Into<String>) -> Text2SqlError {
        Text2SqlError::contract(self, detail)
    }

    fn expect_string_array(self, value: &Value, what: &str) -> Result<()> {
        let items = value
            .as_array()
            .ok_or_else(|| self.violation(format!("{} must be a list of strings, got {}", what, kind(value))))?;
        if let Some(bad) = items.iter().find(|v| !v.is_string()) {
            return Err(self.violation(format!("{} must contain only strings, found {}", what, kind(bad))));
        }
        Ok(())
    }

    fn validate_field_map(self, value: &Value) -> Result<()> {
        let map = value
            .as_object()
            .ok_or_else(|| self.violation(format!("reply must be an object, got {}", kind(value))))?;
        for (table, fields) in map {
            self.expect_string_array(fields, &format!("fields of table '{}'", table))?;
        }
        Ok(())
    }

    fn validate_constraint_map(self, value: &Value) -> Result<()> {
        let map = value
            .as_object()
            .ok_or_else(|| self.violation(format!("reply must be an object, got {}", kind(value))))?;
        for (table, constraints) in map {
            let record = constraints.as_object().ok_or_else(|| {
                self.violation(format!(
                    "constraints of table '{}' must be an object, got {}",
                    table,
                    kind(constraints)
                ))
            })?;
            for (key, v) in record {
                match key.as_str() {
                    "limit" => {
                        if !(v.is_null() || v.as_u64().is_some()) {
                            return Err(self.violation(format!(
                                "limit of table '{}' must be a non-negative integer or null, got {}",
                                table, v
                            )));
                        }
                    }
                    k if CONSTRAINT_KEYS.contains(&k) => {
                        self.expect_string_array(v, &format!("{} of table '{}'", k, table))?;
                    }
                    other => {
                        return Err(self.violation(format!(
                            "unknown constraint key '{}' for table '{}'",
                            other, table
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_sql_result(self, value: &Value) -> Result<()> {
        let record = value
            .as_object()
            .ok_or_else(|| self.violation(format!("reply must be an object, got {}", kind(value))))?;
        match record.get("sql") {
            Some(Value::String(_)) => {}
            Some(other) => return Err(self.violation(format!("sql must be a string, got {}", kind(other)))),
            None => return Err(self.violation("missing key 'sql'")),
        }
        match record.get("description") {
            Some(Value::String(_)) | Some(Value::Null) => Ok(()),
            Some(other) => Err(self.violation(format!(
                "description must be a string or null, got {}",
                kind(other)
            ))),
            None => Err(self.violation("missing key 'description'")),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Recover the JSON payload from a raw model reply, dropping an optional
/// fenced code block. An unterminated fence runs to the end of the text.
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let after = after
        .strip_prefix("json")
        .or_else(|| after.strip_prefix("JSON"))
        .unwrap_or(after);
    let end = after.find("```").unwrap_or(after.len());
    after[..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail_of(err: Text2SqlError) -> (ResponseContract, String) {
        match err {
            Text2SqlError::ContractViolation { contract, detail } => (contract, detail),
            other => panic!("expected contract violation, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("  [\"user\"] \n"), "[\"user\"]");
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("```\n[1]\n```"), "[1]");
        assert_eq!(extract_json("Here you go:\n```json\n[\"x\"]\n```\nDone."), "[\"x\"]");
        assert_eq!(extract_json("```json\n{\"sql\": \"SELECT 1\""), "{\"sql\": \"SELECT 1\"");
        assert_eq!(extract_json("```json {\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn test_table_list() {
        assert!(ResponseContract::TableList.validate(&json!(["user", "order"])).is_ok());
        assert!(ResponseContract::TableList.validate(&json!([])).is_ok());

        let (contract, detail) = detail_of(ResponseContract::TableList.validate(&json!({"user": 1})).unwrap_err());
        assert_eq!(contract, ResponseContract::TableList);
        assert!(detail.contains("list of strings"));

        assert!(ResponseContract::TableList.validate(&json!(["user", 3])).is_err());
    }

    #[test]
    fn test_field_map() {
        assert!(ResponseContract::FieldMap.validate(&json!({"user": ["name", "email"]})).is_ok());

        let (contract, detail) =
            detail_of(ResponseContract::FieldMap.validate(&json!({"user": "name"})).unwrap_err());
        assert_eq!(contract, ResponseContract::FieldMap);
        assert!(detail.contains("user"));

        assert!(ResponseContract::FieldMap.validate(&json!(["user"])).is_err());
        assert!(ResponseContract::FieldMap.validate(&json!({"user": [1]})).is_err());
    }

    #[test]
    fn test_constraint_map() {
        let full = json!({"user": {"where": ["age > 18"], "group_by": [], "having": [], "order_by": ["age DESC"], "limit": 10}});
        assert!(ResponseContract::ConstraintMap.validate(&full).is_ok());

        // Missing keys are left for the resolver to fill in.
        let partial = json!({"user": {"where": ["age > 18"]}});
        assert!(ResponseContract::ConstraintMap.validate(&partial).is_ok());

        let null_limit = json!({"user": {"limit": null}});
        assert!(ResponseContract::ConstraintMap.validate(&null_limit).is_ok());

        assert!(ResponseContract::ConstraintMap.validate(&json!({"user": {"limit": -1}})).is_err());
        assert!(ResponseContract::ConstraintMap.validate(&json!({"user": {"limit": "10"}})).is_err());
        assert!(ResponseContract::ConstraintMap.validate(&json!({"user": {"where": "age > 18"}})).is_err());
        assert!(ResponseContract::ConstraintMap.validate(&json!({"user": {"select": []}})).is_err());
        assert!(ResponseContract::ConstraintMap.validate(&json!({"user": []})).is_err());
    }

    #[test]
    fn test_sql_result() {
        assert!(ResponseContract::SqlResult
            .validate(&json!({"sql": "SELECT 1", "description": "one"}))
            .is_ok());
        assert!(ResponseContract::SqlResult
            .validate(&json!({"sql": "SELECT 1", "description": null}))
            .is_ok());

        let (_, detail) =
            detail_of(ResponseContract::SqlResult.validate(&json!({"sql": "SELECT 1"})).unwrap_err());
        assert!(detail.contains("description"));

        assert!(ResponseContract::SqlResult.validate(&json!({"description": "x"})).is_err());
        assert!(ResponseContract::SqlResult.validate(&json!("SELECT 1")).is_err());
    }

    #[test]
    fn test_untyped_accepts_anything() {
        assert!(ResponseContract::Untyped.validate(&json!(42)).is_ok());
        assert!(ResponseContract::Untyped.validate(&json!({"anything": [1, 2]})).is_ok());
    }
}
