//! Tenant Gate (spec §4.5): API-key authentication, quota/rate enforcement,
//! and the billing webhook lifecycle.

pub mod apikey;
pub mod quota;
pub mod webhook;

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::cache::Cache;
use crate::error::AppError;
use crate::model::ApiUsageLog;
use crate::persistence::{ApiKeyDao, Db, SubscriptionDao, UsageDao, UserDao};
use quota::{RateLimitDecision, RateLimiter};

/// Floor below which an authentication miss's response latency is padded,
/// so a caller can't distinguish "no such key" from "key exists, other
/// reject" by timing (spec §4.5).
const AUTH_MISS_FLOOR: Duration = Duration::from_millis(50);

#[derive(Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub api_key_id: Uuid,
    pub subscription_id: Uuid,
    pub monthly_quota: i64,
    pub current_usage: i64,
    pub rate_limit_per_minute: i64,
    pub billing_period_end: i64,
}

pub struct RateLimitStatus {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: i64,
    pub quota_limit: i64,
    pub quota_remaining: i64,
    pub quota_reset: i64,
}

pub struct TenantGate {
    db: Db,
    salt: String,
    cache: Arc<dyn Cache>,
    limiter: RateLimiter,
}

impl TenantGate {
    pub fn new(db: Db, salt: String, cache: Arc<dyn Cache>) -> Self {
        TenantGate {
            db,
            salt,
            cache,
            limiter: RateLimiter::new(),
        }
    }

    /// Authentication path (spec §4.5): one parameterized lookup joining the
    /// active key with its user and active subscription. Any rejection path
    /// pads total latency to `AUTH_MISS_FLOOR` to avoid a key-existence
    /// timing oracle.
    pub async fn authenticate(&self, raw_key: &str) -> Result<AuthContext, AppError> {
        let start = Instant::now();

        if !apikey::looks_well_formed(raw_key) {
            pad_latency(start).await;
            return Err(AppError::Unauthenticated("malformed API key".into()));
        }

        let key_hash = apikey::hash(&self.salt, raw_key);
        let row = match ApiKeyDao::find_by_hash(&self.db, &key_hash).await? {
            Some(row) => row,
            None => {
                pad_latency(start).await;
                return Err(AppError::Unauthenticated("invalid API key".into()));
            }
        };

        if row.user_status != "active" {
            pad_latency(start).await;
            return Err(AppError::SubscriptionInactive);
        }

        let (subscription_id, monthly_quota, current_usage, rate_limit_per_minute, billing_period_end) =
            match (
                row.subscription_id,
                row.monthly_quota,
                row.current_usage,
                row.rate_limit_per_minute,
                row.billing_period_end,
            ) {
                (Some(sid), Some(quota), Some(usage), Some(rate), Some(end))
                    if row.subscription_status.as_deref() == Some("active") =>
                {
                    (sid, quota, usage, rate, end)
                }
                _ => {
                    pad_latency(start).await;
                    return Err(AppError::SubscriptionInactive);
                }
            };

        let user_id = row.user_id;
        let db = self.db.clone();
        tokio::spawn(async move {
            let _ = UserDao::touch_last_login(&db, user_id, chrono::Utc::now().timestamp()).await;
        });

        Ok(AuthContext {
            user_id,
            api_key_id: row.api_key.id,
            subscription_id,
            monthly_quota,
            current_usage,
            rate_limit_per_minute,
            billing_period_end,
        })
    }

    /// Quota and rate enforcement (spec §4.5, steps 1-3; step 2 "not active"
    /// was already folded into `authenticate`). Always returns a
    /// `RateLimitStatus` — including on rejection — so the caller can stamp
    /// `X-RateLimit-*`/`X-Quota-*` on a 429 the same as on a success (spec
    /// §6: these headers are present on every response, not just 2xx).
    pub async fn check_quota_and_rate(&self, ctx: &AuthContext, now: i64) -> (RateLimitStatus, Option<AppError>) {
        if ctx.current_usage >= ctx.monthly_quota {
            let status = RateLimitStatus {
                limit: ctx.rate_limit_per_minute,
                remaining: 0,
                reset_at: now,
                quota_limit: ctx.monthly_quota,
                quota_remaining: 0,
                quota_reset: ctx.billing_period_end,
            };
            return (status, Some(AppError::QuotaExceeded { reset_at: ctx.billing_period_end }));
        }

        match self
            .limiter
            .check_and_increment(self.cache.as_ref(), &ctx.api_key_id.to_string(), ctx.rate_limit_per_minute as u32, now)
            .await
        {
            RateLimitDecision::Limited { retry_after_secs } => {
                let status = RateLimitStatus {
                    limit: ctx.rate_limit_per_minute,
                    remaining: 0,
                    reset_at: now + retry_after_secs as i64,
                    quota_limit: ctx.monthly_quota,
                    quota_remaining: (ctx.monthly_quota - ctx.current_usage).max(0),
                    quota_reset: ctx.billing_period_end,
                };
                (status, Some(AppError::RateLimited { retry_after_secs }))
            }
            RateLimitDecision::Allowed { remaining, reset_at } => {
                let status = RateLimitStatus {
                    limit: ctx.rate_limit_per_minute,
                    remaining: remaining as i64,
                    reset_at,
                    quota_limit: ctx.monthly_quota,
                    quota_remaining: (ctx.monthly_quota - ctx.current_usage - 1).max(0),
                    quota_reset: ctx.billing_period_end,
                };
                (status, None)
            }
        }
    }

    /// Step 4: fire-and-forget usage accounting, detached from the request
    /// deadline (spec §5 "Background writes... survive client disconnect").
    pub fn record_usage(&self, ctx: &AuthContext, log: ApiUsageLog) {
        let db = self.db.clone();
        let subscription_id = ctx.subscription_id;
        let api_key_id = ctx.api_key_id;
        tokio::spawn(async move {
            let _ = SubscriptionDao::increment_usage(&db, subscription_id).await;
            let _ = ApiKeyDao::increment_total_calls(&db, api_key_id).await;
            let _ = UsageDao::insert(&db, &log).await;
        });
    }
}

async fn pad_latency(start: Instant) {
    let elapsed = start.elapsed();
    if elapsed < AUTH_MISS_FLOOR {
        tokio::time::sleep(AUTH_MISS_FLOOR - elapsed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Plan, Subscription, SubscriptionStatus, User, UserStatus};
    use crate::persistence::{open_in_memory, SubscriptionDao, UserDao};

    async fn seeded_gate() -> (TenantGate, String) {
        let db = open_in_memory().unwrap();
        let salt = "0123456789abcdef0123456789abcdef";
        let user = User {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            full_name: None,
            company_name: None,
            plan: Plan::Starter,
            status: UserStatus::Active,
            external_user_id: Some("ext-1".into()),
            created_at: 0,
            last_login_at: None,
        };
        UserDao::insert(&db, &user).await.unwrap();

        let terms = Plan::Starter.catalog();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: user.id,
            plan: Plan::Starter,
            monthly_quota: terms.monthly_quota,
            rate_limit_per_minute: terms.rate_limit_per_minute,
            current_usage: 0,
            billing_period_start: 0,
            billing_period_end: 1_000_000,
            status: SubscriptionStatus::Active,
            price_cents: terms.price_cents,
            cancelled_at: None,
        };
        SubscriptionDao::insert(&db, &subscription).await.unwrap();

        let minted = apikey::mint(salt);
        let key = crate::model::ApiKey {
            id: Uuid::new_v4(),
            user_id: user.id,
            key_hash: minted.key_hash,
            key_prefix: minted.key_prefix,
            name: None,
            active: true,
            total_calls: 0,
            created_at: 0,
            revoked_at: None,
            expires_at: None,
        };
        crate::persistence::ApiKeyDao::insert(&db, &key).await.unwrap();

        let cache: Arc<dyn Cache> = Arc::new(crate::cache::InMemoryCache::new());
        (TenantGate::new(db, salt.to_string(), cache), minted.raw)
    }

    #[tokio::test]
    async fn authenticates_a_valid_key() {
        let (gate, raw_key) = seeded_gate().await;
        let ctx = gate.authenticate(&raw_key).await.unwrap();
        assert_eq!(ctx.monthly_quota, Plan::Starter.catalog().monthly_quota);
    }

    #[tokio::test]
    async fn rejects_a_malformed_key_without_hitting_the_database() {
        let (gate, _) = seeded_gate().await;
        let err = gate.authenticate("not-a-real-key").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn enforces_the_rate_limit() {
        let (gate, raw_key) = seeded_gate().await;
        let ctx = gate.authenticate(&raw_key).await.unwrap();
        let limit = ctx.rate_limit_per_minute as u32;
        for _ in 0..limit {
            let (_, err) = gate.check_quota_and_rate(&ctx, 0).await;
            assert!(err.is_none());
        }
        let (_, err) = gate.check_quota_and_rate(&ctx, 0).await;
        assert!(matches!(err, Some(AppError::RateLimited { .. })));
    }
}
