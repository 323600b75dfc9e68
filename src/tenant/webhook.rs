//! HMAC signature verification and billing-lifecycle handlers for
//! `POST /webhooks/apix` (spec §4.5 "Webhook lifecycle" / "Webhook authenticity").

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{ApiKey, Plan, Subscription, SubscriptionStatus, User, UserStatus};
use crate::persistence::{ApiKeyDao, Db, SubscriptionDao, UserDao};
use crate::tenant::apikey;

type HmacSha256 = Hmac<Sha256>;

const REPLAY_WINDOW_SECS: i64 = 300;
const BILLING_PERIOD_SECS: i64 = 30 * 24 * 3600;

/// `x-webhook-signature = hex(HMAC-SHA256(webhookSecret, rawBody))`.
pub fn verify_signature(secret: &str, raw_body: &[u8], signature_header: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(raw_body);
    let expected = hex::encode(mac.finalize().into_bytes());
    let provided = signature_header.trim().to_ascii_lowercase();
    // Equal-length requirement first: `ct_eq` panics on mismatched lengths.
    expected.len() == provided.len() && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}

/// Rejects payloads whose `timestamp` is more than 5 minutes in the past.
pub fn check_replay(event_timestamp: i64, now: i64) -> Result<(), AppError> {
    if now - event_timestamp > REPLAY_WINDOW_SECS {
        return Err(AppError::Unauthenticated("webhook payload has expired".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub timestamp: i64,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SubscribedData {
    external_user_id: String,
    email: String,
    full_name: Option<String>,
    company_name: Option<String>,
    plan: Plan,
}

#[derive(Debug, Deserialize)]
struct PlanChangedData {
    external_user_id: String,
    plan: Plan,
}

#[derive(Debug, Deserialize)]
struct ExternalIdOnly {
    external_user_id: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub enum WebhookOutcome {
    Subscribed {
        user_id: Uuid,
        subscription_id: Uuid,
        plan: Plan,
        key_prefix: String,
    },
    PlanChanged {
        user_id: Uuid,
        plan: Plan,
    },
    Cancelled {
        user_id: Uuid,
    },
    Renewed {
        user_id: Uuid,
        subscription_id: Uuid,
    },
}

/// Dispatches one already-authenticated, already-replay-checked payload.
/// Unknown event types are the caller's `400 UnknownEvent` (spec §4.5).
pub async fn handle_event(
    db: &Db,
    salt: &str,
    payload: &WebhookPayload,
    now: i64,
) -> Result<WebhookOutcome, AppError> {
    match payload.event.as_str() {
        "user.subscribed" => handle_subscribed(db, salt, payload, now).await,
        "user.plan_changed" => handle_plan_changed(db, payload).await,
        "user.cancelled" => handle_cancelled(db, payload, now).await,
        "user.renewed" => handle_renewed(db, payload, now).await,
        other => Err(AppError::InvalidRequest(format!("unknown webhook event: {other}"))),
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(payload: &WebhookPayload) -> Result<T, AppError> {
    serde_json::from_value(payload.data.clone())
        .map_err(|e| AppError::InvalidRequest(format!("malformed webhook payload: {e}")))
}

async fn handle_subscribed(
    db: &Db,
    salt: &str,
    payload: &WebhookPayload,
    now: i64,
) -> Result<WebhookOutcome, AppError> {
    let data: SubscribedData = parse_data(payload)?;

    let user = match UserDao::get_by_external_id(db, &data.external_user_id).await? {
        Some(existing) => existing,
        None => {
            let user = User {
                id: Uuid::new_v4(),
                email: data.email.to_lowercase(),
                full_name: data.full_name,
                company_name: data.company_name,
                plan: data.plan,
                status: UserStatus::Active,
                external_user_id: Some(data.external_user_id),
                created_at: now,
                last_login_at: None,
            };
            UserDao::insert(db, &user).await?;
            user
        }
    };

    let terms = data.plan.catalog();
    let subscription = Subscription {
        id: Uuid::new_v4(),
        user_id: user.id,
        plan: data.plan,
        monthly_quota: terms.monthly_quota,
        rate_limit_per_minute: terms.rate_limit_per_minute,
        current_usage: 0,
        billing_period_start: now,
        billing_period_end: now + BILLING_PERIOD_SECS,
        status: SubscriptionStatus::Active,
        price_cents: terms.price_cents,
        cancelled_at: None,
    };
    SubscriptionDao::insert(db, &subscription).await?;

    let minted = apikey::mint(salt);
    let key = ApiKey {
        id: Uuid::new_v4(),
        user_id: user.id,
        key_hash: minted.key_hash,
        key_prefix: minted.key_prefix.clone(),
        name: None,
        active: true,
        total_calls: 0,
        created_at: now,
        revoked_at: None,
        expires_at: None,
    };
    ApiKeyDao::insert(db, &key).await?;

    Ok(WebhookOutcome::Subscribed {
        user_id: user.id,
        subscription_id: subscription.id,
        plan: data.plan,
        key_prefix: minted.key_prefix,
    })
}

async fn handle_plan_changed(db: &Db, payload: &WebhookPayload) -> Result<WebhookOutcome, AppError> {
    let data: PlanChangedData = parse_data(payload)?;
    let user = UserDao::get_by_external_id(db, &data.external_user_id)
        .await?
        .ok_or_else(|| AppError::WebhookSubjectUnresolved(data.external_user_id.clone()))?;

    UserDao::update_plan(db, user.id, data.plan).await?;
    if let Some(subscription) = SubscriptionDao::get_active_for_user(db, user.id).await? {
        SubscriptionDao::update_plan(db, subscription.id, data.plan).await?;
    }

    Ok(WebhookOutcome::PlanChanged {
        user_id: user.id,
        plan: data.plan,
    })
}

async fn handle_cancelled(db: &Db, payload: &WebhookPayload, now: i64) -> Result<WebhookOutcome, AppError> {
    let data: ExternalIdOnly = parse_data(payload)?;
    let user = UserDao::get_by_external_id(db, &data.external_user_id)
        .await?
        .ok_or_else(|| AppError::WebhookSubjectUnresolved(data.external_user_id.clone()))?;

    if let Some(subscription) = SubscriptionDao::get_active_for_user(db, user.id).await? {
        SubscriptionDao::cancel(db, subscription.id, now).await?;
    }
    UserDao::set_status(db, user.id, UserStatus::Cancelled).await?;

    Ok(WebhookOutcome::Cancelled { user_id: user.id })
}

async fn handle_renewed(db: &Db, payload: &WebhookPayload, now: i64) -> Result<WebhookOutcome, AppError> {
    let data: ExternalIdOnly = parse_data(payload)?;
    let user = UserDao::get_by_external_id(db, &data.external_user_id)
        .await?
        .ok_or_else(|| AppError::WebhookSubjectUnresolved(data.external_user_id.clone()))?;

    let subscription = SubscriptionDao::get_active_for_user(db, user.id)
        .await?
        .ok_or_else(|| AppError::WebhookSubjectUnresolved(data.external_user_id.clone()))?;

    SubscriptionDao::renew(db, subscription.id, now, now + BILLING_PERIOD_SECS).await?;

    Ok(WebhookOutcome::Renewed {
        user_id: user.id,
        subscription_id: subscription.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_signature() {
        let secret = "a-long-enough-webhook-secret-value";
        let body = br#"{"event":"user.cancelled"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(verify_signature(secret, body, &sig));
    }

    #[test]
    fn rejects_tampered_body() {
        let secret = "a-long-enough-webhook-secret-value";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(b"{\"event\":\"user.cancelled\"}");
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(!verify_signature(secret, b"{\"event\":\"user.renewed\"}", &sig));
    }

    #[test]
    fn rejects_stale_timestamp() {
        assert!(check_replay(1_000, 1_000 + 301).is_err());
        assert!(check_replay(1_000, 1_000 + 299).is_ok());
    }
}
