pub mod types;
pub mod classification;
pub mod retry;
pub mod circuit_breaker;

pub use types::ScanError;
pub use classification::{ErrorClass, ErrorClassification, ErrorKind};
pub use retry::{BackoffStrategy, RetryPolicy, StatusBearing};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
