//! Per-key sliding-minute rate limiter (spec §4.5: "a per-key sliding-minute
//! counter backed by the KV store, falling back to an in-process LRU table
//! only when the KV store is unavailable").

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheExt};

const DEFAULT_CAPACITY: usize = 1000;
const WINDOW_SECS: i64 = 60;
const CACHE_KEY_PREFIX: &str = "ratelimit:";
/// Kept alive in the KV store for two windows, so a counter that's briefly
/// unread still has its previous-window value available for the sliding
/// estimate.
const CACHE_ENTRY_TTL: Duration = Duration::from_secs((WINDOW_SECS * 2) as u64);

#[derive(Clone, Copy, Serialize, Deserialize)]
struct Counter {
    window_start: i64,
    current_count: u32,
    previous_count: u32,
}

impl Counter {
    fn fresh(window_start: i64) -> Self {
        Counter {
            window_start,
            current_count: 0,
            previous_count: 0,
        }
    }

    /// Rolls the counter to `window_start` if needed, then checks and
    /// records one request against `limit_per_minute`.
    fn advance_and_check(&mut self, window_start: i64, now: i64, limit_per_minute: u32) -> RateLimitDecision {
        if self.window_start != window_start {
            self.previous_count = if window_start - self.window_start == WINDOW_SECS {
                self.current_count
            } else {
                0
            };
            self.window_start = window_start;
            self.current_count = 0;
        }

        let elapsed_frac = (now - window_start) as f64 / WINDOW_SECS as f64;
        let estimated = self.previous_count as f64 * (1.0 - elapsed_frac) + self.current_count as f64;

        if estimated >= limit_per_minute as f64 {
            let retry_after = (WINDOW_SECS - (now - window_start)).max(1) as u64;
            return RateLimitDecision::Limited { retry_after_secs: retry_after };
        }

        self.current_count += 1;
        let remaining = (limit_per_minute as f64 - estimated - 1.0).max(0.0) as u32;
        RateLimitDecision::Allowed {
            remaining,
            reset_at: window_start + WINDOW_SECS,
        }
    }
}

pub enum RateLimitDecision {
    Allowed { remaining: u32, reset_at: i64 },
    Limited { retry_after_secs: u64 },
}

/// A sliding-window counter approximated from the current and previous
/// fixed minute buckets, keyed by API key id. The KV `Cache` is the primary
/// store (`check_and_increment`); the in-process LRU table here is only the
/// fallback used when the cache reports unavailable (spec §4.5, §5
/// "In-process rate-limit table: LRU with O(1) get/set, protected by
/// internal synchronization").
pub struct RateLimiter {
    table: Mutex<LruCache<String, Counter>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            table: Mutex::new(LruCache::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap())),
        }
    }

    /// Primary path: reads and writes the counter through `cache`. Falls
    /// back to the in-process LRU table when `cache` is unavailable (the
    /// degraded `NoopCache` mode, spec §6 "no KV host configured").
    pub async fn check_and_increment(&self, cache: &dyn Cache, key: &str, limit_per_minute: u32, now: i64) -> RateLimitDecision {
        if !cache.is_available() {
            return self.check_and_increment_in_process(key, limit_per_minute, now);
        }

        let window_start = now - now.rem_euclid(WINDOW_SECS);
        let cache_key = format!("{CACHE_KEY_PREFIX}{key}");
        let mut counter: Counter = cache.get_json(&cache_key).await.unwrap_or_else(|| Counter::fresh(window_start));
        let decision = counter.advance_and_check(window_start, now, limit_per_minute);
        cache.set_json(&cache_key, &counter, CACHE_ENTRY_TTL).await;
        decision
    }

    fn check_and_increment_in_process(&self, key: &str, limit_per_minute: u32, now: i64) -> RateLimitDecision {
        let mut table = self.table.lock().expect("rate limiter mutex poisoned");
        let window_start = now - now.rem_euclid(WINDOW_SECS);

        if table.get(key).is_none() {
            table.put(key.to_string(), Counter::fresh(window_start));
        }
        let counter = table.get_mut(key).expect("just inserted");
        counter.advance_and_check(window_start, now, limit_per_minute)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryCache, NoopCache};

    #[tokio::test]
    async fn allows_requests_under_the_limit() {
        let limiter = RateLimiter::new();
        let cache = InMemoryCache::new();
        for _ in 0..5 {
            match limiter.check_and_increment(&cache, "k1", 10, 1_000).await {
                RateLimitDecision::Allowed { .. } => {}
                RateLimitDecision::Limited { .. } => panic!("should not be limited yet"),
            }
        }
    }

    #[tokio::test]
    async fn rejects_once_the_limit_is_reached() {
        let limiter = RateLimiter::new();
        let cache = InMemoryCache::new();
        for _ in 0..3 {
            limiter.check_and_increment(&cache, "k2", 3, 1_000).await;
        }
        match limiter.check_and_increment(&cache, "k2", 3, 1_000).await {
            RateLimitDecision::Limited { retry_after_secs } => assert!(retry_after_secs > 0),
            RateLimitDecision::Allowed { .. } => panic!("should be limited"),
        }
    }

    #[tokio::test]
    async fn resets_after_the_window_rolls_over() {
        let limiter = RateLimiter::new();
        let cache = InMemoryCache::new();
        for _ in 0..3 {
            limiter.check_and_increment(&cache, "k3", 3, 1_000).await;
        }
        match limiter.check_and_increment(&cache, "k3", 3, 1_120).await {
            RateLimitDecision::Allowed { .. } => {}
            RateLimitDecision::Limited { .. } => panic!("new window should have capacity"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_in_process_when_the_cache_is_unavailable() {
        let limiter = RateLimiter::new();
        let cache = NoopCache;
        for _ in 0..3 {
            limiter.check_and_increment(&cache, "k4", 3, 1_000).await;
        }
        match limiter.check_and_increment(&cache, "k4", 3, 1_000).await {
            RateLimitDecision::Limited { .. } => {}
            RateLimitDecision::Allowed { .. } => panic!("in-process fallback should still enforce the limit"),
        }
    }
}
