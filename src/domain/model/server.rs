use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Backend definition a `request` step is dispatched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ServerConfig {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            timeout: default_timeout_ms(),
        }
    }

    /// Join `endpoint` onto the base URL with exactly one `/` between them.
    /// Absolute endpoints are returned unchanged.
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// Backend id → definition.
pub type ServerMap = HashMap<String, ServerConfig>;
