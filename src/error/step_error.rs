use thiserror::Error;

use super::{ErrorCode, ErrorContext};

/// Step-level errors
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("Variable resolution error: {0}")]
    VariableResolution(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("Timeout: request exceeded {0} ms")]
    Timeout(u64),
    #[error("Loop iteration limit exceeded: {0}")]
    LoopLimitExceeded(usize),
    #[error("Invalid loop source: {0}")]
    InvalidLoopSource(String),
    #[error("Step cancelled")]
    Cancelled,
}

impl StepError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StepError::VariableResolution(_) => ErrorCode::VariableNotFound,
            StepError::Config(_) => ErrorCode::ConfigError,
            StepError::Http(_) => ErrorCode::NetworkError,
            StepError::HttpStatus { status, .. } if *status >= 500 => ErrorCode::HttpServerError,
            StepError::HttpStatus { .. } => ErrorCode::HttpClientError,
            StepError::Timeout(_) => ErrorCode::Timeout,
            StepError::LoopLimitExceeded(_) => ErrorCode::LoopLimitExceeded,
            StepError::InvalidLoopSource(_) => ErrorCode::InvalidLoopSource,
            StepError::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// Convert into the serializable form stored on a step result.
    pub fn to_context(&self) -> ErrorContext {
        let ctx = ErrorContext::new(self.code(), self.to_string());
        match self {
            StepError::HttpStatus { status, .. } => ctx.with_http_status(*status),
            _ => ctx,
        }
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::Config(e.to_string())
    }
}
