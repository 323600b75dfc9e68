//! Request-id plumbing and the Tenant Gate middleware (spec §4.5, §6):
//! authenticate → quota/rate-check → run the handler → stamp rate-limit
//! headers → fire-and-forget usage accounting.

use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::error::AppError;
use crate::model::ApiUsageLog;
use crate::tenant::{AuthContext, RateLimitStatus};

use super::error::ApiError;
use super::state::AppState;

const MAX_BODY_BYTES: usize = 100 * 1024;

#[derive(Clone)]
pub struct RequestId(pub String);

/// Honors or generates `x-request-id`, echoes it on every response, and
/// folds it into the JSON body of error responses (spec §6 "A request-id
/// header is honored or generated and echoed back"; §7 "every response
/// carries the requestId").
pub async fn request_id_layer(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    if response.status().is_client_error() || response.status().is_server_error() {
        response = inject_request_id(response, &request_id).await;
    }
    response
}

async fn inject_request_id(response: Response, request_id: &str) -> Response {
    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };
    let mut value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };
    if let Some(obj) = value.as_object_mut() {
        obj.insert("requestId".into(), serde_json::Value::String(request_id.to_string()));
    }
    Response::from_parts(parts, Body::from(serde_json::to_vec(&value).unwrap_or_default()))
}

/// Tenant Gate middleware: every protected route runs through this before
/// reaching its handler (spec §5 "Control flow: ... HTTP Surface → Tenant
/// Gate (authenticate, rate-check, quota-check) → Handler").
pub async fn tenant_gate_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default();
    let method = req.method().to_string();
    let endpoint = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let raw_key = match req.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        Some(k) => k.to_string(),
        None => {
            return ApiError::from(AppError::Unauthenticated("missing x-api-key header".into())).into_response()
        }
    };

    let ctx = match state.tenant.authenticate(&raw_key).await {
        Ok(ctx) => ctx,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let now = chrono::Utc::now().timestamp();
    let (rate_status, rejection) = state.tenant.check_quota_and_rate(&ctx, now).await;

    if let Some(err) = rejection {
        let mut response = ApiError::from(err).into_response();
        stamp_rate_headers(response.headers_mut(), &rate_status);
        return response;
    }

    req.extensions_mut().insert(ctx);
    let mut response = next.run(req).await;
    stamp_rate_headers(response.headers_mut(), &rate_status);

    let log = ApiUsageLog {
        user_id: ctx.user_id,
        api_key_id: ctx.api_key_id,
        endpoint,
        method,
        status_code: response.status().as_u16(),
        response_time_ms: start.elapsed().as_millis() as u64,
        user_agent,
        ip_address: None,
        request_id,
        timestamp: now,
    };
    state.tenant.record_usage(&ctx, log);

    response
}

/// Stamped on every response through the Tenant Gate, success or rejection
/// (spec §6: "always, including success" only makes sense as a guarantee if
/// it also covers a 429 — a client needs `X-RateLimit-Reset` to know when to
/// retry).
fn stamp_rate_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    set_i64_header(headers, "x-ratelimit-limit", status.limit);
    set_i64_header(headers, "x-ratelimit-remaining", status.remaining);
    set_i64_header(headers, "x-ratelimit-reset", status.reset_at);
    set_i64_header(headers, "x-quota-limit", status.quota_limit);
    set_i64_header(headers, "x-quota-remaining", status.quota_remaining);
    set_i64_header(headers, "x-quota-reset", status.quota_reset);
}

fn set_i64_header(headers: &mut HeaderMap, name: &'static str, value: i64) {
    if let Ok(v) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), v);
    }
}

/// Transport policy (spec §6 "CORS / transport"): in production, plain HTTP
/// is refused outright; every response otherwise carries the standard
/// strict-transport/referrer/content-security headers.
pub async fn security_layer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.production {
        let is_https = req
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("https"))
            .unwrap_or(false);
        if !is_https {
            let body = serde_json::json!({ "error": "https_required" });
            return (StatusCode::FORBIDDEN, axum::Json(body)).into_response();
        }
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert("content-security-policy", HeaderValue::from_static("default-src 'none'"));
    response
}
