use serde::{Deserialize, Serialize};

use super::types::ScanError;

/// Category of a failure as seen by retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    InvalidArgument,
    ToolNotFound,
    ToolTimeout,
    ToolFailed,
    Network,
    Timeout,
    RetryableStatus,
    CircuitOpen,
    InvalidUrl,
    MissingBaseline,
    Cancelled,
    Io,
    Decode,
}

/// How a failure affects the scan as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Worth retrying; counted against circuit breakers.
    Transient,
    /// Bad input for one item; skipped locally.
    Structural,
    /// Aborts the scan before any phase runs.
    Fatal,
    /// A guard or budget gave up; the phase continues with partial data.
    Exhaustion,
}

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub kind: ErrorKind,
    pub class: ErrorClass,
}

impl ErrorClassification {
    fn new(error_type: &'static str, kind: ErrorKind, class: ErrorClass) -> Self {
        Self { error_type, kind, class }
    }

    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }

    pub fn is_fatal(&self) -> bool {
        self.class == ErrorClass::Fatal
    }
}

impl ScanError {
    /// Classify this error into its retry category and scan-level class.
    pub fn classify(&self) -> ErrorClassification {
        use ErrorClass::*;
        match self {
            ScanError::Network(_) => ErrorClassification::new("NetworkError", ErrorKind::Network, Transient),
            ScanError::Timeout(_) => ErrorClassification::new("TimeoutError", ErrorKind::Timeout, Transient),
            ScanError::ToolTimeout { .. } => {
                ErrorClassification::new("ToolTimeoutError", ErrorKind::ToolTimeout, Transient)
            }
            ScanError::ToolFailed { .. } => {
                ErrorClassification::new("ToolFailedError", ErrorKind::ToolFailed, Transient)
            }
            ScanError::RetryableStatus { .. } => {
                ErrorClassification::new("RetryableStatusError", ErrorKind::RetryableStatus, Transient)
            }
            ScanError::Io(_) => ErrorClassification::new("IoError", ErrorKind::Io, Transient),

            ScanError::InvalidUrl(_) => ErrorClassification::new("InvalidUrlError", ErrorKind::InvalidUrl, Structural),
            ScanError::MissingBaseline(_) => {
                ErrorClassification::new("MissingBaselineError", ErrorKind::MissingBaseline, Structural)
            }
            ScanError::Json(_) => ErrorClassification::new("JsonError", ErrorKind::Decode, Structural),
            ScanError::InvalidArgument(_) => {
                ErrorClassification::new("InvalidArgumentError", ErrorKind::InvalidArgument, Structural)
            }

            ScanError::Config(_) => ErrorClassification::new("ConfigError", ErrorKind::Config, Fatal),
            ScanError::Yaml(_) => ErrorClassification::new("ConfigError", ErrorKind::Config, Fatal),
            ScanError::ToolNotFound(_) => {
                ErrorClassification::new("ToolNotFoundError", ErrorKind::ToolNotFound, Fatal)
            }

            ScanError::CircuitOpen(_) => {
                ErrorClassification::new("CircuitOpenError", ErrorKind::CircuitOpen, Exhaustion)
            }
            ScanError::Cancelled => ErrorClassification::new("CancelledError", ErrorKind::Cancelled, Exhaustion),
        }
    }

    /// Status code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ScanError::RetryableStatus { status } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_network_error_transient() {
        let err = ScanError::Network("connection reset".into());
        let class = err.classify();
        assert!(class.is_transient());
        assert_eq!(class.kind, ErrorKind::Network);
        assert_eq!(class.error_type, "NetworkError");
    }

    #[test]
    fn test_tool_timeout_transient() {
        let err = ScanError::ToolTimeout { tool: "subfinder".into(), timeout: Duration::from_secs(5) };
        assert!(err.classify().is_transient());
        assert_eq!(err.classify().kind, ErrorKind::ToolTimeout);
    }

    #[test]
    fn test_missing_tool_fatal() {
        let err = ScanError::ToolNotFound("nuclei".into());
        let class = err.classify();
        assert!(class.is_fatal());
        assert!(!class.is_transient());
    }

    #[test]
    fn test_config_error_fatal() {
        let err = ScanError::Config("similarity_threshold out of range".into());
        assert!(err.classify().is_fatal());
    }

    #[test]
    fn test_missing_baseline_structural() {
        let err = ScanError::MissingBaseline("http://a.test/?id=".into());
        assert_eq!(err.classify().class, ErrorClass::Structural);
    }

    #[test]
    fn test_circuit_open_exhaustion() {
        let err = ScanError::CircuitOpen("nuclei".into());
        assert_eq!(err.classify().class, ErrorClass::Exhaustion);
    }

    #[test]
    fn test_status_code_only_on_retryable_status() {
        assert_eq!(ScanError::RetryableStatus { status: 503 }.status_code(), Some(503));
        assert_eq!(ScanError::Network("x".into()).status_code(), None);
    }
}
