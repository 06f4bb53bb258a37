//! Scenario document parsing and serialization (YAML/JSON/TOML).

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::sanitize::sanitize_scenario;
use super::validation::validate_scenario_value;
use crate::domain::model::Scenario;
use crate::error::{ScenarioError, ScenarioResult};

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DslFormat {
    /// YAML format (`.yaml` / `.yml`).
    Yaml,
    /// JSON format (`.json`).
    Json,
    /// TOML format (`.toml`).
    Toml,
}

impl DslFormat {
    /// Pick a format from a file extension; anything unknown is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => DslFormat::Yaml,
            Some("toml") => DslFormat::Toml,
            _ => DslFormat::Json,
        }
    }
}

/// Parse text into an untyped JSON value.
pub fn parse_value(content: &str, format: DslFormat) -> ScenarioResult<Value> {
    match format {
        DslFormat::Yaml => {
            serde_saphyr::from_str(content).map_err(|e| ScenarioError::ParseError(e.to_string()))
        }
        DslFormat::Json => {
            serde_json::from_str(content).map_err(|e| ScenarioError::ParseError(e.to_string()))
        }
        DslFormat::Toml => {
            // Go through toml::Value so untyped fields (bodies, condition
            // values) come out as plain JSON.
            let toml_val: toml::Value =
                toml::from_str(content).map_err(|e| ScenarioError::ParseError(e.to_string()))?;
            Ok(toml_value_to_json(toml_val))
        }
    }
}

/// Parse, validate, and sanitize a scenario document.
///
/// Validation errors abort with [`ScenarioError::ValidationFailed`]; warnings
/// are logged. Dangling references are dropped on the way in.
pub fn parse_scenario(content: &str, format: DslFormat) -> ScenarioResult<Scenario> {
    let value = parse_value(content, format)?;
    let report = validate_scenario_value(&value);
    if !report.is_valid {
        return Err(ScenarioError::ValidationFailed(Box::new(report)));
    }
    for warning in report.warnings() {
        debug!(code = %warning.code, step_id = ?warning.step_id, "{}", warning.message);
    }
    let scenario: Scenario =
        serde_json::from_value(value).map_err(|e| ScenarioError::ParseError(e.to_string()))?;
    let (scenario, _) = sanitize_scenario(&scenario);
    Ok(scenario)
}

/// Read and parse a scenario file; the format follows the extension.
pub fn load_scenario(path: impl AsRef<Path>) -> ScenarioResult<Scenario> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| ScenarioError::ParseError(format!("{}: {}", path.display(), e)))?;
    parse_scenario(&content, DslFormat::from_path(path))
}

/// Serialize a scenario in the given format.
pub fn serialize_scenario(scenario: &Scenario, format: DslFormat) -> ScenarioResult<String> {
    match format {
        DslFormat::Json => serde_json::to_string_pretty(scenario)
            .map_err(|e| ScenarioError::SerializeError(e.to_string())),
        DslFormat::Yaml => serde_saphyr::to_string(scenario)
            .map_err(|e| ScenarioError::SerializeError(e.to_string())),
        DslFormat::Toml => toml::to_string_pretty(scenario)
            .map_err(|e| ScenarioError::SerializeError(e.to_string())),
    }
}

/// Convert a [`toml::Value`] into a [`serde_json::Value`].
///
/// TOML does not have a null type, so `Datetime` values are stringified.
fn toml_value_to_json(val: toml::Value) -> Value {
    match val {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_value_to_json).collect()),
        toml::Value::Table(tbl) => Value::Object(
            tbl.into_iter()
                .map(|(k, v)| (k, toml_value_to_json(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
    }
}
