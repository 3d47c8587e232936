//! Rule document loading.
//!
//! Rule documents are YAML or JSON, chosen by file extension. Parsing
//! produces the typed document the caller asks for; schema-level
//! validation happens later, in `RuleBook::add_rule`, where the rule index
//! is known.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::audit::errors::AuditError;

/// Read and parse a rule document from `path`.
pub fn read_and_parse_file<T: DeserializeOwned>(path: &Path) -> Result<T, AuditError> {
    let contents = std::fs::read_to_string(path).map_err(|source| AuditError::RuleFileLoad {
        path: path.display().to_string(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "yaml" | "yml" => parse_yaml(&contents),
        "json" => parse_json(&contents),
        _ => Err(AuditError::UnsupportedRuleFormat(
            path.display().to_string(),
        )),
    }
}

pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, AuditError> {
    serde_yaml::from_str(contents).map_err(|e| AuditError::RuleParse(e.to_string()))
}

pub fn parse_json<T: DeserializeOwned>(contents: &str) -> Result<T, AuditError> {
    serde_json::from_str(contents).map_err(|e| AuditError::RuleParse(e.to_string()))
}
