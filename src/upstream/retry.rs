//! Exponential-backoff retry helper.
//!
//! Generalizes `fetch_data::types::retry` from the teacher into the jittered
//! policy spec §4.1 requires: base 100ms, factor 2, jitter ±25%, max 3 tries.

use std::time::Duration;

use rand::Rng;

use crate::error::AppError;

pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_attempts: u32,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base: Duration::from_millis(100),
            factor: 2,
            max_attempts: 3,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as f64 * self.factor.pow(attempt) as f64;
        let jitter_frac = rand::rng().random_range(-self.jitter..=self.jitter);
        let jittered = (base_ms * (1.0 + jitter_frac)).max(0.0);
        Duration::from_millis(jittered as u64)
    }
}

/// Retries `f` up to `policy.max_attempts` times. A closure returning
/// `Err(AppError::UpstreamBadResponse(_))` is *not* retried — only
/// transient failures (`UpstreamUnavailable`, `UpstreamRateLimited`) are.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, f: F) -> Result<T, AppError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let mut last_err = None;
    for attempt in 0..policy.max_attempts {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e @ AppError::UpstreamBadResponse(_)) => return Err(e),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| AppError::UpstreamUnavailable("retry exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            base: Duration::from_millis(1),
            ..Default::default()
        };
        let result = retry(&policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(AppError::UpstreamUnavailable("boom".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn does_not_retry_bad_response() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            base: Duration::from_millis(1),
            ..Default::default()
        };
        let result: Result<(), AppError> = retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::UpstreamBadResponse("malformed".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            base: Duration::from_millis(1),
            max_attempts: 3,
            ..Default::default()
        };
        let result: Result<(), AppError> = retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::UpstreamUnavailable("boom".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
