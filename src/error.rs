//! Error taxonomy (spec §7). `AppError` is the single error type threaded
//! through every component; `api::error` projects it onto HTTP responses.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("subscription inactive")]
    SubscriptionInactive,

    #[error("quota exceeded, resets {reset_at}")]
    QuotaExceeded { reset_at: i64 },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    /// A webhook payload's `external_user_id` doesn't resolve to a known
    /// user (spec §7: webhook failures are 5xx so the marketplace retries;
    /// only an unrecognized event type is a 4xx). Distinct from `NotFound`,
    /// which is the client-facing "no such resource" case.
    #[error("webhook subject unresolved: {0}")]
    WebhookSubjectUnresolved(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream rate limited: {0}")]
    UpstreamRateLimited(String),

    #[error("upstream returned a bad response: {0}")]
    UpstreamBadResponse(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Internal(format!("db error: {err}"))
    }
}

pub type AppResult<T> = Result<T, AppError>;
