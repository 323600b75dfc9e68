//! `GET /api/v1/intent/:signature` (spec §6, §4.6).

use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::error::AppError;
use crate::intent::IntentPrediction;
use crate::tenant::AuthContext;

use super::super::error::ApiError;
use super::super::normalize;
use super::super::state::AppState;

pub async fn get_intent(
    State(state): State<AppState>,
    Extension(_ctx): Extension<AuthContext>,
    Path(signature): Path<String>,
) -> Result<Json<IntentPrediction>, ApiError> {
    normalize::validate_signature(&signature)?;

    let tx = state
        .upstream
        .get_transaction(&signature)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no transaction with signature {signature}")))?;

    Ok(Json(state.intent.predict_intent(&tx).await))
}
