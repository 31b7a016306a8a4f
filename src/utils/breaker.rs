//! Circuit breaker guarding the embedder, generator, vector index and
//! cache (spec §5). `CLOSED -> OPEN -> HALF_OPEN`, grounded on
//! `original_source/backend/src/shared/utils/errors.py`'s `CircuitBreaker`:
//! a failure counter trips the breaker at `failure_threshold`, an elapsed
//! `recovery_timeout` lets one probe through as HALF_OPEN, success there
//! resets to CLOSED, success while CLOSED decrements the counter instead
//! of zeroing it outright.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Per-dependency breaker. Cheap to clone (shares the inner mutex).
#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name,
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Arc::new(Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                opened_at: None,
            })),
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    debug!(breaker = self.name, "breaker half-open probe allowed");
                }
            }
        }
        inner.state
    }

    /// Whether a call should even be attempted, given the current state.
    pub fn allow_request(&self) -> bool {
        !matches!(self.state(), BreakerState::Open)
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                inner.opened_at = None;
                debug!(breaker = self.name, "breaker closed after successful probe");
            }
            BreakerState::Closed => {
                inner.failures = inner.failures.saturating_sub(1);
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(breaker = self.name, "breaker re-opened after failed probe");
            }
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(breaker = self.name, failures = inner.failures, "breaker opened");
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Run `fut` if the breaker allows it, recording success/failure.
    /// Returns `None` when the breaker is open (caller takes the
    /// degraded path without attempting the call at all).
    pub async fn call<F, Fut, T, E>(&self, fut: F) -> Option<Result<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            debug!(breaker = self.name, "breaker open, short-circuiting");
            return None;
        }
        let result = fut().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        Some(result)
    }
}

/// `base_delay * 2^attempt`, capped at `max_delay` — grounded on
/// `RetryPolicy.get_delay` in the same Python module.
pub fn backoff_delay(base_delay: Duration, attempt: u32, max_delay: Duration) -> Duration {
    let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let scaled = base_delay.as_millis().saturating_mul(multiplier as u128);
    Duration::from_millis(scaled.min(max_delay.as_millis()) as u64)
}

/// Bounded retry with exponential backoff around a fallible async op.
/// Every external call in the system (embedder, generator, vector index)
/// goes through this, wrapped again by a [`CircuitBreaker`] at the
/// call site.
pub async fn retry_with_backoff<F, Fut, T, E>(
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(backoff_delay(base_delay, attempt, max_delay)).await;
                }
            }
        }
    }
    Err(last_err.expect("attempts >= 1 guarantees at least one iteration"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_millis(50));
        assert!(breaker.allow_request());
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert!(!breaker.allow_request());
    }

    #[test]
    fn half_opens_after_recovery_timeout() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        breaker.record_failure();
        assert!(!breaker.allow_request());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.allow_request());
    }

    #[test]
    fn success_in_half_open_closes_breaker() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        let _ = breaker.state();
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn backoff_is_capped() {
        let d = backoff_delay(Duration::from_millis(100), 10, Duration::from_secs(2));
        assert_eq!(d, Duration::from_secs(2));
        let d0 = backoff_delay(Duration::from_millis(100), 0, Duration::from_secs(2));
        assert_eq!(d0, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let mut calls = 0;
        let result: Result<u32, &str> = retry_with_backoff(3, Duration::from_millis(1), Duration::from_millis(5), || {
            calls += 1;
            async move {
                if calls < 2 {
                    Err("boom")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
    }
}
