use std::collections::HashSet;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classification::ErrorKind;
use super::types::ScanError;

/// Delay growth between consecutive retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
    Fibonacci,
}

impl BackoffStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exponential => "exponential",
            Self::Linear => "linear",
            Self::Fibonacci => "fibonacci",
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            "fibonacci" => Ok(Self::Fibonacci),
            other => Err(ScanError::InvalidArgument(format!("Unknown backoff strategy: {}", other))),
        }
    }
}

impl std::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Results that carry an HTTP-like status code. A retryable status is treated
/// as a failed attempt by [`RetryPolicy::retry_status`].
pub trait StatusBearing {
    fn status_code(&self) -> Option<u16>;
}

/// Retry configuration for flaky network and subprocess operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub retryable_kinds: HashSet<ErrorKind>,
    pub retryable_statuses: HashSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: true,
            retryable_kinds: default_retryable_kinds(),
            retryable_statuses: default_retryable_statuses(),
        }
    }
}

pub fn default_retryable_kinds() -> HashSet<ErrorKind> {
    [ErrorKind::Network, ErrorKind::Timeout, ErrorKind::ToolTimeout, ErrorKind::ToolFailed]
        .into_iter()
        .collect()
}

pub fn default_retryable_statuses() -> HashSet<u16> {
    [429, 500, 502, 503, 504].into_iter().collect()
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    ///
    /// - exponential: `initial * factor^(attempt-1)`
    /// - linear: `initial * attempt`
    /// - fibonacci: `initial * fib(attempt)`
    ///
    /// The result never exceeds `max_delay`, jitter included.
    pub fn compute_delay(&self, attempt: u32, strategy: BackoffStrategy) -> Duration {
        let attempt = attempt.max(1);
        let initial = self.initial_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();

        let base = match strategy {
            BackoffStrategy::Exponential => {
                let exponent = (attempt - 1).min(1024) as i32;
                initial * self.backoff_factor.powi(exponent)
            }
            BackoffStrategy::Linear => initial * attempt as f64,
            BackoffStrategy::Fibonacci => initial * fibonacci(attempt) as f64,
        };

        let mut delay = if base.is_finite() { base.min(max) } else { max };
        if self.jitter && delay > 0.0 {
            delay = rand::thread_rng().gen_range(0.5 * delay..=1.5 * delay).min(max);
        }
        Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(self.max_delay)
    }

    /// Whether `error` belongs to a retryable category or carries a retryable status.
    pub fn should_retry(&self, error: &ScanError) -> bool {
        if self.retryable_kinds.contains(&error.classify().kind) {
            return true;
        }
        error
            .status_code()
            .map_or(false, |status| self.should_retry_status(status))
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Run `factory` up to `max_retries + 1` times, backing off between
    /// retryable failures. The last error is returned unchanged.
    pub async fn retry<F, Fut, T>(
        &self,
        operation_name: &str,
        strategy: BackoffStrategy,
        factory: F,
    ) -> Result<T, ScanError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScanError>>,
    {
        self.execute(operation_name, strategy, factory, |_: &T| None).await
    }

    /// Like [`retry`](Self::retry), but a successful result whose status code
    /// is retryable counts as a failed attempt.
    pub async fn retry_status<F, Fut, T>(
        &self,
        operation_name: &str,
        strategy: BackoffStrategy,
        factory: F,
    ) -> Result<T, ScanError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScanError>>,
        T: StatusBearing,
    {
        self.execute(operation_name, strategy, factory, T::status_code).await
    }

    async fn execute<F, Fut, T, S>(
        &self,
        operation_name: &str,
        strategy: BackoffStrategy,
        mut factory: F,
        status_of: S,
    ) -> Result<T, ScanError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScanError>>,
        S: Fn(&T) -> Option<u16>,
    {
        let max_attempts = self.max_retries + 1;
        let mut attempt = 1;

        loop {
            let error = match factory().await {
                Ok(value) => match status_of(&value).filter(|s| self.should_retry_status(*s)) {
                    None => return Ok(value),
                    Some(status) => ScanError::RetryableStatus { status },
                },
                Err(e) => e,
            };

            if !self.should_retry(&error) {
                debug!(
                    operation = operation_name,
                    error_type = error.classify().error_type,
                    "Non-retryable error, failing immediately"
                );
                return Err(error);
            }
            if attempt >= max_attempts {
                warn!(
                    operation = operation_name,
                    attempt,
                    max = max_attempts,
                    error = %error,
                    "Max retries exhausted"
                );
                return Err(error);
            }

            let delay = self.compute_delay(attempt, strategy);
            warn!(
                operation = operation_name,
                attempt,
                max = max_attempts,
                strategy = %strategy,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after error"
            );
            self.sleep_with_jitter(delay).await;
            attempt += 1;
        }
    }

    /// Extra ±10% spread so concurrent callers do not retry in lockstep.
    async fn sleep_with_jitter(&self, delay: Duration) {
        let mut secs = delay.as_secs_f64();
        if self.jitter && secs > 0.0 {
            secs += rand::thread_rng().gen_range(-0.1 * secs..=0.1 * secs);
        }
        tokio::time::sleep(Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(delay)).await;
    }
}

fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_exponential_monotonic_and_capped() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: false,
            ..RetryPolicy::default()
        };
        let mut previous = Duration::ZERO;
        for attempt in 1..=20 {
            let d = policy.compute_delay(attempt, BackoffStrategy::Exponential);
            assert!(d >= previous, "attempt {} decreased", attempt);
            assert!(d <= policy.max_delay);
            previous = d;
        }
        assert_eq!(policy.compute_delay(1, BackoffStrategy::Exponential), Duration::from_secs(1));
        assert_eq!(policy.compute_delay(3, BackoffStrategy::Exponential), Duration::from_secs(4));
        assert_eq!(policy.compute_delay(20, BackoffStrategy::Exponential), Duration::from_secs(30));
    }

    #[test]
    fn test_linear_and_fibonacci_delays() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(100),
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.compute_delay(3, BackoffStrategy::Linear), Duration::from_secs(6));
        assert_eq!(policy.compute_delay(1, BackoffStrategy::Fibonacci), Duration::from_secs(2));
        assert_eq!(policy.compute_delay(2, BackoffStrategy::Fibonacci), Duration::from_secs(2));
        assert_eq!(policy.compute_delay(5, BackoffStrategy::Fibonacci), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
            jitter: true,
            ..RetryPolicy::default()
        };
        for _ in 0..200 {
            let d = policy.compute_delay(1, BackoffStrategy::Linear).as_secs_f64();
            assert!((2.0..=6.0).contains(&d), "delay {} out of band", d);
        }
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = "quadratic".parse::<BackoffStrategy>().unwrap_err();
        assert!(matches!(err, ScanError::InvalidArgument(_)));
        assert_eq!("Fibonacci".parse::<BackoffStrategy>().unwrap(), BackoffStrategy::Fibonacci);
    }

    #[test]
    fn test_should_retry_by_kind_and_status() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&ScanError::Network("reset".into())));
        assert!(policy.should_retry(&ScanError::RetryableStatus { status: 503 }));
        assert!(!policy.should_retry(&ScanError::RetryableStatus { status: 418 }));
        assert!(!policy.should_retry(&ScanError::ToolNotFound("amass".into())));
        assert!(!policy.should_retry(&ScanError::CircuitOpen("nuclei".into())));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = quick_policy(3)
            .retry("flaky", BackoffStrategy::Exponential, || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ScanError::Network("reset".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = quick_policy(3)
            .retry("fatal", BackoffStrategy::Linear, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ScanError::ToolNotFound("gau".into()))
                }
            })
            .await;
        assert!(matches!(result, Err(ScanError::ToolNotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_original_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = quick_policy(2)
            .retry("slow tool", BackoffStrategy::Fibonacci, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ScanError::ToolTimeout {
                        tool: "amass".into(),
                        timeout: Duration::from_secs(3),
                    })
                }
            })
            .await;
        match result {
            Err(ScanError::ToolTimeout { tool, timeout }) => {
                assert_eq!(tool, "amass");
                assert_eq!(timeout, Duration::from_secs(3));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    struct Reply(u16);

    impl StatusBearing for Reply {
        fn status_code(&self) -> Option<u16> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn test_retryable_status_counts_as_failure() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = quick_policy(3)
            .retry_status("status", BackoffStrategy::Exponential, || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Reply(if n == 0 { 503 } else { 200 }))
                }
            })
            .await;
        assert_eq!(result.unwrap().0, 200);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retryable_status_exhaustion_surfaces_status() {
        let result = quick_policy(1)
            .retry_status("always busy", BackoffStrategy::Linear, || async { Ok(Reply(429)) })
            .await;
        assert!(matches!(result, Err(ScanError::RetryableStatus { status: 429 })));
    }
}
