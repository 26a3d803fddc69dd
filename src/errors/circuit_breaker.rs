use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::types::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// How a call got through the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Closed,
    Probe,
}

#[derive(Debug)]
struct CircuitStatus {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    probe_in_flight: bool,
}

/// Guards one class of external call. Only transient failures are counted;
/// other errors pass through without moving the state.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    status: Mutex<CircuitStatus>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            status: Mutex::new(CircuitStatus {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Run `operation` through the breaker. Rejected calls fail with
    /// `CircuitOpen` and never poll the operation.
    pub async fn call<T, F>(&self, operation: F) -> Result<T, ScanError>
    where
        F: Future<Output = Result<T, ScanError>>,
    {
        let admission = self.admit()?;
        let mut guard = ProbeGuard { breaker: self, armed: admission == Admission::Probe };

        let result = operation.await;
        guard.armed = false;
        match &result {
            Ok(_) => self.record_success(admission),
            Err(e) if e.classify().is_transient() => self.record_failure(admission),
            Err(_) if admission == Admission::Probe => self.release_probe(),
            Err(_) => {}
        }
        result
    }

    fn admit(&self) -> Result<Admission, ScanError> {
        let mut status = self.lock();
        match status.state {
            CircuitState::Closed => Ok(Admission::Closed),
            CircuitState::Open => {
                let cooled_down = status
                    .last_failure_time
                    .map_or(true, |t| t.elapsed() >= self.config.reset_timeout);
                if cooled_down {
                    debug!(breaker = %self.name, "Circuit breaker half-open, admitting probe");
                    status.state = CircuitState::HalfOpen;
                    status.probe_in_flight = true;
                    Ok(Admission::Probe)
                } else {
                    Err(ScanError::CircuitOpen(self.name.clone()))
                }
            }
            CircuitState::HalfOpen => {
                if status.probe_in_flight {
                    Err(ScanError::CircuitOpen(self.name.clone()))
                } else {
                    status.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    // Outcomes of calls admitted while closed only count while the circuit is
    // still closed. Only the probe moves the circuit out of half-open.
    fn record_success(&self, admission: Admission) {
        let mut status = self.lock();
        match admission {
            Admission::Probe => {
                debug!(breaker = %self.name, "Circuit breaker closing after successful probe");
                status.state = CircuitState::Closed;
                status.failure_count = 0;
                status.probe_in_flight = false;
            }
            Admission::Closed if status.state == CircuitState::Closed => status.failure_count = 0,
            Admission::Closed => {}
        }
    }

    fn record_failure(&self, admission: Admission) {
        let mut status = self.lock();
        match admission {
            Admission::Probe => {
                warn!(breaker = %self.name, "Circuit breaker reopening after failed probe");
                status.failure_count += 1;
                status.last_failure_time = Some(Instant::now());
                status.probe_in_flight = false;
                status.state = CircuitState::Open;
            }
            Admission::Closed if status.state == CircuitState::Closed => {
                status.failure_count += 1;
                status.last_failure_time = Some(Instant::now());
                if status.failure_count >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = status.failure_count,
                        "Circuit breaker opening after consecutive failures"
                    );
                    status.state = CircuitState::Open;
                }
            }
            Admission::Closed => {}
        }
    }

    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    fn lock(&self) -> MutexGuard<'_, CircuitStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Frees the half-open slot if the probe future is dropped before finishing.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "subfinder",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_millis(reset_ms),
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), ScanError> {
        cb.call(async { Err::<(), _>(ScanError::Network("down".into())) }).await
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let cb = breaker(3, 10_000);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 3);

        let invoked = Arc::new(AtomicU32::new(0));
        let counter = invoked.clone();
        let result = cb
            .call(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ScanError>(())
            })
            .await;
        assert!(matches!(result, Err(ScanError::CircuitOpen(name)) if name == "subfinder"));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_probe_closes_and_resets() {
        let cb = breaker(2, 30);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let value = cb.call(async { Ok::<_, ScanError>(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_probe_reopens() {
        let cb = breaker(1, 30);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.call(async { Ok::<_, ScanError>(()) }).await;
        assert!(matches!(result, Err(ScanError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn test_half_open_admits_single_probe() {
        let cb = breaker(1, 20);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let probe = cb.call(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ScanError>("probe")
        });
        let contender = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cb.call(async { Ok::<_, ScanError>("contender") }).await
        };
        let (probe_result, contender_result) = tokio::join!(probe, contender);

        assert_eq!(probe_result.unwrap(), "probe");
        assert!(matches!(contender_result, Err(ScanError::CircuitOpen(_))));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_non_transient_errors_not_counted() {
        let cb = breaker(1, 10_000);
        let result = cb
            .call(async { Err::<(), _>(ScanError::InvalidUrl("::".into())) })
            .await;
        assert!(matches!(result, Err(ScanError::InvalidUrl(_))));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_success_in_closed_resets_counter() {
        let cb = breaker(3, 10_000);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.failure_count(), 2);
        cb.call(async { Ok::<_, ScanError>(()) }).await.unwrap();
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_success_does_not_close_open_circuit() {
        let cb = breaker(1, 10_000);
        let slow = cb.call(async {
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok::<_, ScanError>("slow")
        });
        let tripping = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = fail(&cb).await;
            assert_eq!(cb.state(), CircuitState::Open);
        };
        let (slow_result, _) = tokio::join!(slow, tripping);

        assert_eq!(slow_result.unwrap(), "slow");
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 1);
        assert!(matches!(cb.call(async { Ok::<_, ScanError>(()) }).await, Err(ScanError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn test_stale_failure_does_not_free_half_open_slot() {
        let cb = breaker(1, 30);
        let stale = cb.call(async {
            tokio::time::sleep(Duration::from_millis(80)).await;
            Err::<(), _>(ScanError::Network("late".into()))
        });
        let sequence = async {
            let _ = fail(&cb).await;
            tokio::time::sleep(Duration::from_millis(40)).await;
            // Half-open call still running when the stale failure lands.
            let admitted = cb.call(async {
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok::<_, ScanError>("admitted")
            });
            let contender = async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cb.call(async { Ok::<_, ScanError>("contender") }).await
            };
            tokio::join!(admitted, contender)
        };
        let (_, (admitted_result, contender_result)) = tokio::join!(stale, sequence);

        assert_eq!(admitted_result.unwrap(), "admitted");
        assert!(matches!(contender_result, Err(ScanError::CircuitOpen(_))));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }
}
