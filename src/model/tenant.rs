//! Tenant-gate records: users, subscriptions, API keys, webhook audit log
//! (spec §3, §4.5).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Starter,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "starter" => Some(Plan::Starter),
            "pro" => Some(Plan::Pro),
            "enterprise" => Some(Plan::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Starter => "starter",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    /// Plan catalog, spec §6 "Plan catalog (authoritative; seed)".
    pub fn catalog(&self) -> PlanTerms {
        match self {
            Plan::Starter => PlanTerms {
                monthly_quota: 1_000,
                rate_limit_per_minute: 10,
                price_cents: 1_000,
            },
            Plan::Pro => PlanTerms {
                monthly_quota: 10_000,
                rate_limit_per_minute: 60,
                price_cents: 5_000,
            },
            Plan::Enterprise => PlanTerms {
                monthly_quota: 100_000,
                rate_limit_per_minute: 600,
                price_cents: 20_000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanTerms {
    pub monthly_quota: i64,
    pub rate_limit_per_minute: i64,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub plan: Plan,
    pub status: UserStatus,
    pub external_user_id: Option<String>,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan: Plan,
    pub monthly_quota: i64,
    pub rate_limit_per_minute: i64,
    pub current_usage: i64,
    pub billing_period_start: i64,
    pub billing_period_end: i64,
    pub status: SubscriptionStatus,
    pub price_cents: i64,
    pub cancelled_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_hash: String,
    pub key_prefix: String,
    pub name: Option<String>,
    pub active: bool,
    pub total_calls: i64,
    pub created_at: i64,
    pub revoked_at: Option<i64>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub source: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub received_at: i64,
    pub processed: bool,
    pub processed_at: Option<i64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUsageLog {
    pub user_id: Uuid,
    pub api_key_id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub request_id: String,
    pub timestamp: i64,
}
