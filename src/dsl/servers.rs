//! Backend definitions.

use serde_json::Value;

use super::parser::{parse_value, DslFormat};
use crate::domain::model::{ServerConfig, ServerMap};
use crate::error::{ScenarioError, ScenarioResult};

/// Parse a server list (`[{id, baseUrl, ...}]`) or map (`{id: {baseUrl, ...}}`).
///
/// In the map form a missing `id` is taken from the key.
pub fn parse_servers(content: &str, format: DslFormat) -> ScenarioResult<ServerMap> {
    servers_from_value(parse_value(content, format)?)
}

pub fn servers_from_value(value: Value) -> ScenarioResult<ServerMap> {
    let entries: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .map(|(key, mut entry)| {
                if let Some(obj) = entry.as_object_mut() {
                    obj.entry("id").or_insert(Value::String(key));
                }
                entry
            })
            .collect(),
        _ => {
            return Err(ScenarioError::ConfigError(
                "server definitions must be an array or an object".into(),
            ))
        }
    };

    let mut servers = ServerMap::with_capacity(entries.len());
    for entry in entries {
        let server: ServerConfig = serde_json::from_value(entry)
            .map_err(|e| ScenarioError::ConfigError(format!("invalid server definition: {}", e)))?;
        validate_server(&server)?;
        if servers.contains_key(&server.id) {
            return Err(ScenarioError::ConfigError(format!(
                "duplicate server id: {}",
                server.id
            )));
        }
        servers.insert(server.id.clone(), server);
    }
    Ok(servers)
}

fn validate_server(server: &ServerConfig) -> ScenarioResult<()> {
    if server.id.trim().is_empty() {
        return Err(ScenarioError::ConfigError("server id is empty".into()));
    }
    let url = reqwest::Url::parse(&server.base_url).map_err(|e| {
        ScenarioError::ConfigError(format!(
            "server {} has invalid baseUrl {}: {}",
            server.id, server.base_url, e
        ))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScenarioError::ConfigError(format!(
            "server {} baseUrl must be http or https",
            server.id
        )));
    }
    if server.timeout == 0 {
        return Err(ScenarioError::ConfigError(format!(
            "server {} timeout must be positive",
            server.id
        )));
    }
    Ok(())
}
