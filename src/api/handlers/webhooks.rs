//! `POST /webhooks/apix` (spec §4.5): HMAC-authenticated billing lifecycle
//! events from the upstream marketplace.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::persistence::WebhookDao;
use crate::tenant::webhook;

use super::super::error::ApiError;
use super::super::state::AppState;

const SOURCE: &str = "apix";

/// Every event is logged (`WebhookEvent`) before it's handled, so a retried
/// delivery of the same event converges rather than re-running side effects
/// from scratch (spec §8).
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Result<Response, ApiError> {
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok()).unwrap_or("");
    if !content_type.starts_with("application/json") {
        return Err(AppError::InvalidRequest("webhook payload must be application/json".into()).into());
    }

    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthenticated("missing x-webhook-signature header".into()))?;

    if !webhook::verify_signature(&state.webhook_secret, &body, signature) {
        return Err(AppError::Unauthenticated("webhook signature mismatch".into()).into());
    }

    let raw_value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidRequest(format!("malformed webhook payload: {e}")))?;
    let payload: webhook::WebhookPayload = serde_json::from_value(raw_value.clone())
        .map_err(|e| AppError::InvalidRequest(format!("malformed webhook payload: {e}")))?;

    let now = chrono::Utc::now().timestamp();
    webhook::check_replay(payload.timestamp, now)?;

    let event_id = WebhookDao::insert_received(&state.db, SOURCE, &payload.event, &raw_value, now).await?;

    match webhook::handle_event(&state.db, &state.api_key_salt, &payload, now).await {
        Ok(outcome) => {
            WebhookDao::mark_processed(&state.db, event_id, now).await?;
            Ok((StatusCode::CREATED, axum::Json(outcome)).into_response())
        }
        Err(err) => {
            WebhookDao::mark_failed(&state.db, event_id, &err.to_string()).await?;
            Err(ApiError::from(err))
        }
    }
}
