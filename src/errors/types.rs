use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool {tool} timed out after {}s", timeout.as_secs_f64())]
    ToolTimeout {
        tool: String,
        timeout: Duration,
    },

    #[error("Tool {tool} failed with exit code {exit_code}: {message}")]
    ToolFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Received retryable status code {status}")]
    RetryableStatus {
        status: u16,
    },

    #[error("Circuit breaker is open for {0}")]
    CircuitOpen(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Baseline unavailable: {0}")]
    MissingBaseline(String),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        let target = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "request".to_string());
        if e.is_timeout() {
            ScanError::Timeout(format!("{}: {}", target, e))
        } else {
            ScanError::Network(format!("{}: {}", target, e))
        }
    }
}

impl From<url::ParseError> for ScanError {
    fn from(e: url::ParseError) -> Self {
        ScanError::InvalidUrl(e.to_string())
    }
}
