pub mod error;
pub mod handlers;
pub mod middleware;
pub mod normalize;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

const MAX_BODY_BYTES: usize = 100 * 1024;

/// Assembles the full HTTP surface (spec §6): public routes (health,
/// registration, the billing webhook) plus a Tenant-Gated sub-router for
/// everything else, wrapped in request-id, transport, and CORS middleware.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/analyze/path", post(handlers::analyze::analyze_path))
        .route("/api/v1/analyze/token", post(handlers::analyze::analyze_token))
        .route("/api/v1/risk/{address}", get(handlers::risk::get_risk))
        .route("/api/v1/intent/{signature}", get(handlers::intent::get_intent))
        .route("/api/v1/trace", post(handlers::trace::trace))
        .route("/api/v1/users/me", get(handlers::users::me))
        .route("/api/v1/users/usage", get(handlers::users::usage))
        .route("/api/v1/users/keys", get(handlers::users::list_keys).post(handlers::users::create_key))
        .route("/api/v1/users/keys/{key_id}", delete(handlers::users::delete_key))
        .route("/api/v1/users/plan", post(handlers::users::change_plan))
        .route("/api/v1/users/cancel", post(handlers::users::cancel))
        .route_layer(from_fn_with_state(state.clone(), middleware::tenant_gate_layer));

    let public = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/users/register", post(handlers::users::register))
        .route("/webhooks/apix", post(handlers::webhooks::receive));

    let cors = build_cors(&state.allowed_origins);

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn_with_state(state.clone(), middleware::security_layer))
        .layer(from_fn(middleware::request_id_layer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}
