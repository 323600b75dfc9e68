//! Circuit breaker guarding upstream calls (spec §4.1).
//!
//! Threshold 5 consecutive failures opens the circuit for 60s; half-open
//! requires 2 consecutive successes to close. Shaped like the teacher's
//! `RateLimiter` (a small `Mutex`-guarded struct with an async `check`-style
//! entry point), generalized to three states instead of a sliding window.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    success_threshold: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_params(5, Duration::from_secs(60), 2)
    }

    pub fn with_params(failure_threshold: u32, open_duration: Duration, success_threshold: u32) -> Self {
        CircuitBreaker {
            failure_threshold,
            open_duration,
            success_threshold,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Returns `true` if a call may proceed. When the breaker is `Open` but
    /// the cooldown has elapsed, transitions to `HalfOpen` and allows the
    /// call through (a probe).
    pub async fn allow(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.open_duration {
                    inner.state = State::HalfOpen;
                    inner.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = 0;
        match inner.state {
            State::Closed => {}
            State::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.success_threshold {
                    inner.state = State::Closed;
                    inner.consecutive_successes = 0;
                }
            }
            State::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_successes = 0;
            }
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            State::Open => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::with_params(3, Duration::from_millis(50), 2);
        for _ in 0..3 {
            assert!(cb.allow().await);
            cb.record_failure().await;
        }
        assert!(!cb.allow().await);
    }

    #[tokio::test]
    async fn half_opens_after_cooldown_and_closes_after_successes() {
        let cb = CircuitBreaker::with_params(1, Duration::from_millis(10), 2);
        cb.record_failure().await;
        assert!(!cb.allow().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.allow().await); // half-open probe
        cb.record_success().await;
        assert!(cb.allow().await); // still half-open, one more success needed
        cb.record_success().await;
        assert!(cb.allow().await); // closed now
    }

    #[tokio::test]
    async fn reopens_if_half_open_probe_fails() {
        let cb = CircuitBreaker::with_params(1, Duration::from_millis(10), 2);
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.allow().await); // half-open probe
        cb.record_failure().await;
        assert!(!cb.allow().await);
    }
}
