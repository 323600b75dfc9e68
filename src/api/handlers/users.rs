//! `/api/v1/users/*` — self-service account management (spec §6).

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{ApiKey, ApiUsageLog, Plan, Subscription, SubscriptionStatus, User, UserStatus};
use crate::persistence::{ApiKeyDao, SubscriptionDao, UsageDao, UserDao};
use crate::tenant::apikey;
use crate::tenant::AuthContext;

use super::super::error::ApiError;
use super::super::state::AppState;

const BILLING_PERIOD_SECS: i64 = 30 * 24 * 3600;
const USAGE_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub plan: Option<Plan>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user: User,
    pub subscription: Subscription,
    pub api_key: ApiKey,
    pub raw_key: String,
}

/// `POST /api/v1/users/register` — public, no Tenant Gate (spec §6).
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::InvalidRequest("email is required".into()).into());
    }
    if UserDao::get_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Conflict(format!("a user with email {email} already exists")).into());
    }

    let plan = request.plan.unwrap_or(Plan::Starter);
    let now = chrono::Utc::now().timestamp();

    let user = User {
        id: Uuid::new_v4(),
        email,
        full_name: request.full_name,
        company_name: request.company_name,
        plan,
        status: UserStatus::Active,
        external_user_id: None,
        created_at: now,
        last_login_at: None,
    };
    UserDao::insert(&state.db, &user).await?;

    let terms = plan.catalog();
    let subscription = Subscription {
        id: Uuid::new_v4(),
        user_id: user.id,
        plan,
        monthly_quota: terms.monthly_quota,
        rate_limit_per_minute: terms.rate_limit_per_minute,
        current_usage: 0,
        billing_period_start: now,
        billing_period_end: now + BILLING_PERIOD_SECS,
        status: SubscriptionStatus::Active,
        price_cents: terms.price_cents,
        cancelled_at: None,
    };
    SubscriptionDao::insert(&state.db, &subscription).await?;

    let minted = apikey::mint(&state.api_key_salt);
    let api_key = ApiKey {
        id: Uuid::new_v4(),
        user_id: user.id,
        key_hash: minted.key_hash,
        key_prefix: minted.key_prefix,
        name: None,
        active: true,
        total_calls: 0,
        created_at: now,
        revoked_at: None,
        expires_at: None,
    };
    ApiKeyDao::insert(&state.db, &api_key).await?;

    Ok(Json(RegisterResponse { user, subscription, api_key, raw_key: minted.raw }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<User>, ApiError> {
    let user = UserDao::get_by_id(&state.db, ctx.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user no longer exists".into()))?;
    Ok(Json(user))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub current_usage: i64,
    pub monthly_quota: i64,
    pub billing_period_end: i64,
    pub recent: Vec<ApiUsageLog>,
}

pub async fn usage(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<UsageResponse>, ApiError> {
    let recent = UsageDao::recent_for_user(&state.db, ctx.user_id, USAGE_HISTORY_LIMIT).await?;
    Ok(Json(UsageResponse {
        current_usage: ctx.current_usage,
        monthly_quota: ctx.monthly_quota,
        billing_period_end: ctx.billing_period_end,
        recent,
    }))
}

pub async fn list_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<ApiKey>>, ApiError> {
    Ok(Json(ApiKeyDao::list_for_user(&state.db, ctx.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyResponse {
    pub api_key: ApiKey,
    pub raw_key: String,
}

pub async fn create_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<CreateKeyRequest>,
) -> Result<Json<CreateKeyResponse>, ApiError> {
    let minted = apikey::mint(&state.api_key_salt);
    let api_key = ApiKey {
        id: Uuid::new_v4(),
        user_id: ctx.user_id,
        key_hash: minted.key_hash,
        key_prefix: minted.key_prefix,
        name: request.name,
        active: true,
        total_calls: 0,
        created_at: chrono::Utc::now().timestamp(),
        revoked_at: None,
        expires_at: None,
    };
    ApiKeyDao::insert(&state.db, &api_key).await?;
    Ok(Json(CreateKeyResponse { api_key, raw_key: minted.raw }))
}

/// Revoking an already-revoked key is a no-op that still returns success (spec §8).
pub async fn delete_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ApiKeyDao::revoke(&state.db, ctx.user_id, key_id, chrono::Utc::now().timestamp()).await?;
    Ok(Json(serde_json::json!({ "revoked": true })))
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: Plan,
}

pub async fn change_plan(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<ChangePlanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    UserDao::update_plan(&state.db, ctx.user_id, request.plan).await?;
    SubscriptionDao::update_plan(&state.db, ctx.subscription_id, request.plan).await?;
    Ok(Json(serde_json::json!({ "plan": request.plan })))
}

/// Cancels only the caller's own subscription and leaves the `User` row
/// active — distinct from the webhook-driven `user.cancelled` handler, which
/// cancels the whole account at the upstream marketplace's request.
pub async fn cancel(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    SubscriptionDao::cancel(&state.db, ctx.subscription_id, chrono::Utc::now().timestamp()).await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}
