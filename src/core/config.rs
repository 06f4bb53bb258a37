//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ScenarioError, ScenarioResult};
use crate::graph::DEFAULT_MAX_NESTING_DEPTH;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Container nesting limit enforced by structural edits.
    pub max_nesting_depth: usize,
    /// Step visits per run before the run fails; guards against edge cycles.
    pub max_steps: usize,
    /// Cap on `while` passes and on `count` loops.
    pub max_loop_iterations: usize,
    /// Request timeout when neither step nor server sets one.
    pub default_timeout_ms: u64,
    pub stop_on_error: bool,
    /// Run the topology checker before executing; violations are logged.
    pub verify_topology: bool,
    pub http: HttpPoolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            max_steps: 10_000,
            max_loop_iterations: 1_000,
            default_timeout_ms: 30_000,
            stop_on_error: false,
            verify_topology: true,
            http: HttpPoolConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> ScenarioResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ScenarioError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> ScenarioResult<Self> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ScenarioError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> ScenarioResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScenarioError::ConfigError(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    pub fn validate(&self) -> ScenarioResult<()> {
        if self.max_nesting_depth == 0 {
            return Err(ScenarioError::ConfigError(
                "max_nesting_depth must be at least 1".into(),
            ));
        }
        if self.max_steps == 0 {
            return Err(ScenarioError::ConfigError("max_steps must be positive".into()));
        }
        if self.default_timeout_ms == 0 {
            return Err(ScenarioError::ConfigError(
                "default_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Connection pool settings for the shared reqwest client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpPoolConfig {
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout_secs: u64,
    /// Upper bound for any single request, on top of per-request timeouts.
    pub client_timeout_secs: u64,
    pub tcp_keepalive_secs: Option<u64>,
    pub http1_only: bool,
}

impl Default for HttpPoolConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 10,
            pool_idle_timeout_secs: 90,
            client_timeout_secs: 300,
            tcp_keepalive_secs: Some(60),
            http1_only: false,
        }
    }
}
