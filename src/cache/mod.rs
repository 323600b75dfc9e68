//! TTL-scoped key-value cache (spec §4, component "Cache").
//!
//! A small trait (per SPEC_FULL §A / spec §9 "small interfaces so tests can
//! substitute deterministic fakes") lets the upstream adapter, entity
//! registry, and risk engine all share one cache without depending on a
//! concrete backend. `InMemoryCache` is the default; `NoopCache` is the
//! degraded mode spec §6 calls for when no KV host is configured.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Option<String>;
    async fn set_raw(&self, key: &str, value: String, ttl: Duration);
    async fn delete(&self, key: &str);

    /// Whether this backend is a real KV store. `false` only for the
    /// degraded `NoopCache` (spec §6 "no KV host configured"); callers that
    /// need a durable/shared counter (the rate limiter, spec §4.5) fall
    /// back to an in-process structure when this is `false`.
    fn is_available(&self) -> bool {
        true
    }
}

/// JSON convenience helpers layered on top of the raw string cache, per
/// SPEC_FULL §A ("Cache... with JSON helpers").
#[async_trait]
pub trait CacheExt: Cache {
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        serde_json::from_str(&raw).ok()
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        if let Ok(raw) = serde_json::to_string(value) {
            self.set_raw(key, raw, ttl).await;
        }
    }
}

impl<T: Cache + ?Sized> CacheExt for T {}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Concurrent, sharded TTL map. Last-writer-wins on overlapping keys, per
/// spec §5 "Shared resources: KV cache... last-writer-wins".
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Degraded no-op cache used when spec §6's optional KV host is absent.
/// Every read misses; every write is discarded.
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn get_raw(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set_raw(&self, _key: &str, _value: String, _ttl: Duration) {}

    async fn delete(&self, _key: &str) {}

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_retrieves_json() {
        let cache = InMemoryCache::new();
        cache.set_json("k", &42u32, Duration::from_secs(60)).await;
        let v: Option<u32> = cache.get_json("k").await;
        assert_eq!(v, Some(42));
    }

    #[tokio::test]
    async fn expires_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set_raw("k", "v".into(), Duration::from_millis(1))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get_raw("k").await, None);
    }

    #[tokio::test]
    async fn noop_cache_never_hits() {
        let cache = NoopCache;
        cache.set_raw("k", "v".into(), Duration::from_secs(60)).await;
        assert_eq!(cache.get_raw("k").await, None);
    }
}
