//! `POST /api/v1/analyze/path` and `POST /api/v1/analyze/token` (spec §6).

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::Value;

use crate::classifier;
use crate::error::AppError;
use crate::model::{FlowPath, Transfer};
use crate::tenant::AuthContext;

use super::super::error::ApiError;
use super::super::normalize;
use super::super::state::AppState;

const DEFAULT_MAX_DEPTH: u32 = 5;
const DEFAULT_TOKEN_ACTIVITY_LIMIT: usize = 100;
const MAX_TOKEN_ACTIVITY_LIMIT: usize = 1000;

#[derive(Debug, Serialize)]
pub struct AnalyzePathResponse {
    pub paths: Vec<FlowPath>,
}

fn parse_optional_json(bytes: &[u8]) -> Result<Option<Value>, AppError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(bytes).map(Some).map_err(|e| AppError::InvalidRequest(format!("malformed JSON body: {e}")))
}

pub async fn analyze_path(
    State(state): State<AppState>,
    Extension(_ctx): Extension<AuthContext>,
    Query(query): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Result<Json<AnalyzePathResponse>, ApiError> {
    let parsed_body = parse_optional_json(&body)?;
    let fields = normalize::merge(parsed_body.as_ref(), &query);

    let address = fields
        .get("address")
        .ok_or_else(|| AppError::InvalidRequest("address is required".into()))?;
    normalize::validate_address(address)?;

    let token = fields
        .get("token")
        .ok_or_else(|| AppError::InvalidRequest("token is required".into()))?;
    normalize::validate_mint(token)?;

    let direction = fields.get("direction").map(|s| s.as_str()).unwrap_or("forward");
    let max_depth: u32 = fields
        .get("maxDepth")
        .map(|s| s.parse::<u32>().map_err(|_| AppError::InvalidRequest("maxDepth must be an integer".into())))
        .transpose()?
        .unwrap_or(DEFAULT_MAX_DEPTH)
        .clamp(1, crate::flowgraph::MAX_DEPTH_CAP);

    let since = fields
        .get("timeRange")
        .map(|raw| normalize::parse_time_range_secs(raw))
        .transpose()?
        .map(|secs| chrono::Utc::now().timestamp() - secs);

    let paths = match direction {
        "forward" => state.flowgraph.build_forward_path(address, token, max_depth, since).await?,
        "backward" => state.flowgraph.build_backward_path(address, token, max_depth, since).await?,
        other => return Err(AppError::InvalidRequest(format!("invalid direction: {other}")).into()),
    };

    Ok(Json(AnalyzePathResponse { paths }))
}

#[derive(Debug, Serialize)]
pub struct AnalyzeTokenResponse {
    pub transfers: Vec<Transfer>,
    pub pools: Vec<String>,
}

pub async fn analyze_token(
    State(state): State<AppState>,
    Extension(_ctx): Extension<AuthContext>,
    Query(query): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Result<Json<AnalyzeTokenResponse>, ApiError> {
    let parsed_body = parse_optional_json(&body)?;
    let fields = normalize::merge(parsed_body.as_ref(), &query);

    let token = fields
        .get("token")
        .ok_or_else(|| AppError::InvalidRequest("token is required".into()))?;
    normalize::validate_mint(token)?;

    let limit: usize = fields
        .get("limit")
        .map(|s| s.parse::<usize>().map_err(|_| AppError::InvalidRequest("limit must be an integer".into())))
        .transpose()?
        .unwrap_or(DEFAULT_TOKEN_ACTIVITY_LIMIT)
        .min(MAX_TOKEN_ACTIVITY_LIMIT);

    let transfers = state.upstream.get_recent_token_activity(token, limit).await?;
    let pools = classifier::detect_liquidity_pools(&transfers).into_iter().collect();

    Ok(Json(AnalyzeTokenResponse { transfers, pools }))
}
