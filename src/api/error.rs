//! Projects `AppError` onto HTTP responses (spec §6, §7): every error body
//! carries `{error, message?, requestId}`. The `requestId` field itself is
//! filled in by `middleware::request_id_layer`, which rewrites the body of
//! any error response after the fact — this module only owns the status
//! code and the `error`/`message` shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::AppError;

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self.0 {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone())),
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", Some(msg.clone())),
            AppError::SubscriptionInactive => (StatusCode::UNAUTHORIZED, "subscription_inactive", None),
            AppError::QuotaExceeded { reset_at } => (
                StatusCode::TOO_MANY_REQUESTS,
                "quota_exceeded",
                Some(format!("resets at {reset_at}")),
            ),
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                Some(format!("retry after {retry_after_secs}s")),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::WebhookSubjectUnresolved(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "webhook_subject_unresolved", None)
            }
            AppError::UpstreamUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable", Some(msg.clone())),
            AppError::UpstreamRateLimited(msg) => (StatusCode::BAD_GATEWAY, "upstream_rate_limited", Some(msg.clone())),
            AppError::UpstreamBadResponse(msg) => (StatusCode::BAD_GATEWAY, "upstream_bad_response", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", None),
        };

        let mut body = json!({ "error": kind });
        if let Some(message) = message {
            body["message"] = json!(message);
        }
        (status, axum::Json(body)).into_response()
    }
}
