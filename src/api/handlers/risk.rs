//! `GET /api/v1/risk/:address` (spec §6, §4.4).

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

use crate::error::AppError;
use crate::model::RiskAssessment;
use crate::tenant::AuthContext;

use super::super::error::ApiError;
use super::super::normalize;
use super::super::state::AppState;

pub async fn get_risk(
    State(state): State<AppState>,
    Extension(_ctx): Extension<AuthContext>,
    Path(address): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<RiskAssessment>, ApiError> {
    normalize::validate_address(&address)?;

    let fields = normalize::normalize_params(&query);
    let token = fields
        .get("token")
        .ok_or_else(|| AppError::InvalidRequest("token is required".into()))?;
    normalize::validate_mint(token)?;

    let assessment = state.risk.assess_risk(&address, token).await?;
    Ok(Json(assessment))
}
