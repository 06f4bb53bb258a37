//! Outbound HTTP for `request` steps.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::core::config::HttpPoolConfig;
use crate::domain::execution::{RequestRecord, ResponseRecord};
use crate::domain::model::{RequestStep, ServerConfig};
use crate::error::{ScenarioError, StepError};

/// Performs one resolved request. The engine only talks to this trait, so
/// tests can script responses.
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send(&self, request: &RequestRecord, timeout: Duration)
        -> Result<ResponseRecord, StepError>;
}

/// reqwest-backed sender sharing one pooled client.
#[derive(Debug, Clone)]
pub struct HttpRequestSender {
    client: reqwest::Client,
}

impl HttpRequestSender {
    pub fn new(config: &HttpPoolConfig) -> Result<Self, ScenarioError> {
        let client = Self::apply_pool_options(reqwest::Client::builder(), config)
            .build()
            .map_err(|e| ScenarioError::ConfigError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn apply_pool_options(
        mut builder: reqwest::ClientBuilder,
        config: &HttpPoolConfig,
    ) -> reqwest::ClientBuilder {
        builder = builder
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .tcp_keepalive(config.tcp_keepalive_secs.map(Duration::from_secs))
            .timeout(Duration::from_secs(config.client_timeout_secs));

        if config.http1_only {
            builder = builder.http1_only();
        }

        builder
    }
}

#[async_trait]
impl RequestSender for HttpRequestSender {
    async fn send(
        &self,
        request: &RequestRecord,
        timeout: Duration,
    ) -> Result<ResponseRecord, StepError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| StepError::Config(e.to_string()))?;
        let mut builder = self.client.request(method, &request.url).timeout(timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder = match &request.body {
            None => builder,
            Some(Value::String(text)) => builder.body(text.clone()),
            Some(json) => builder.json(json),
        };

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StepError::Timeout(timeout.as_millis() as u64)
            } else {
                StepError::Http(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                StepError::Timeout(timeout.as_millis() as u64)
            } else {
                StepError::Http(e.to_string())
            }
        })?;
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(url = %request.url, status, duration_ms, "HTTP response received");

        Ok(ResponseRecord {
            status,
            headers,
            body: parse_body(text),
            duration_ms,
        })
    }
}

/// JSON bodies are parsed; anything else stays text. Empty bodies are `null`.
pub fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Server headers first, then enabled step headers; a step header replaces
/// a server header of the same name regardless of case.
pub fn merge_headers(
    server: &ServerConfig,
    step_headers: impl IntoIterator<Item = (String, String)>,
) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = server.headers.clone();
    for (key, value) in step_headers {
        merged.retain(|existing, _| !existing.eq_ignore_ascii_case(&key));
        merged.insert(key, value);
    }
    merged
}

/// Step timeout, then server timeout, then the engine default.
pub fn effective_timeout(step: &RequestStep, server: &ServerConfig, default_ms: u64) -> Duration {
    let ms = step
        .timeout_ms
        .filter(|t| *t > 0)
        .or(Some(server.timeout).filter(|t| *t > 0))
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::HttpMethod;
    use serde_json::json;

    #[test]
    fn test_merge_headers_case_insensitive_override() {
        let mut server = ServerConfig::new("api", "http://x");
        server.headers.insert("Authorization".into(), "Bearer server".into());
        server.headers.insert("X-Env".into(), "test".into());
        let merged = merge_headers(
            &server,
            vec![("authorization".to_string(), "Bearer step".to_string())],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["authorization"], "Bearer step");
        assert_eq!(merged["X-Env"], "test");
    }

    #[test]
    fn test_effective_timeout_precedence() {
        let mut server = ServerConfig::new("api", "http://x");
        server.timeout = 2_000;
        let mut step = RequestStep::new("api", HttpMethod::Get, "/");
        assert_eq!(effective_timeout(&step, &server, 30_000), Duration::from_millis(2_000));
        step.timeout_ms = Some(500);
        assert_eq!(effective_timeout(&step, &server, 30_000), Duration::from_millis(500));
        server.timeout = 0;
        step.timeout_ms = None;
        assert_eq!(effective_timeout(&step, &server, 30_000), Duration::from_millis(30_000));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body("{\"a\":1}".into()), json!({"a": 1}));
        assert_eq!(parse_body("plain".into()), json!("plain"));
        assert_eq!(parse_body("  ".into()), Value::Null);
    }

    #[tokio::test]
    async fn test_http_sender_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/users")
            .match_header("x-token", "abc")
            .match_body(mockito::Matcher::Json(json!({"name": "alice"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7}"#)
            .create_async()
            .await;

        let sender = HttpRequestSender::new(&HttpPoolConfig::default()).unwrap();
        let request = RequestRecord {
            method: HttpMethod::Post,
            url: format!("{}/users", server.url()),
            headers: BTreeMap::from([("x-token".to_string(), "abc".to_string())]),
            body: Some(json!({"name": "alice"})),
        };
        let response = sender.send(&request, Duration::from_secs(5)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 201);
        assert_eq!(response.body, json!({"id": 7}));
        assert_eq!(response.headers["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_http_sender_connection_error() {
        let sender = HttpRequestSender::new(&HttpPoolConfig::default()).unwrap();
        let request = RequestRecord {
            method: HttpMethod::Get,
            url: "http://127.0.0.1:1/unreachable".into(),
            headers: BTreeMap::new(),
            body: None,
        };
        let err = sender.send(&request, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, StepError::Http(_) | StepError::Timeout(_)));
    }
}
