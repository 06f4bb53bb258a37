use serde::{Deserialize, Serialize};

/// Error classification code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Common
    ConfigError,
    Timeout,
    Cancelled,
    InternalError,

    // Network/HTTP
    NetworkError,
    HttpClientError,
    HttpServerError,

    // Variables
    VariableNotFound,

    // Containers
    LoopLimitExceeded,
    InvalidLoopSource,
}

/// Structured error context recorded on a step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl ErrorContext {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}
