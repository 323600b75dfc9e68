//! `POST /api/v1/trace` (spec §6): batch transaction lookup plus intent
//! classification, with an optional co-occurrence graph.

use std::collections::HashSet;

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::intent::IntentPrediction;
use crate::model::ParsedTransaction;
use crate::tenant::AuthContext;

use super::super::error::ApiError;
use super::super::normalize;
use super::super::state::AppState;

const MAX_SIGNATURES: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRequest {
    pub signatures: Vec<String>,
    #[serde(default)]
    pub build_graph: bool,
}

#[derive(Debug, Serialize)]
pub struct TraceEdge {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Serialize)]
pub struct TraceGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<TraceEdge>,
}

#[derive(Debug, Serialize)]
pub struct TraceResponse {
    pub transactions: Vec<ParsedTransaction>,
    pub intents: Vec<IntentPrediction>,
    pub graph: Option<TraceGraph>,
}

pub async fn trace(
    State(state): State<AppState>,
    Extension(_ctx): Extension<AuthContext>,
    Json(request): Json<TraceRequest>,
) -> Result<Json<TraceResponse>, ApiError> {
    if request.signatures.is_empty() || request.signatures.len() > MAX_SIGNATURES {
        return Err(AppError::InvalidRequest(format!(
            "signatures must contain between 1 and {MAX_SIGNATURES} entries"
        ))
        .into());
    }
    for signature in &request.signatures {
        normalize::validate_signature(signature)?;
    }

    let mut transactions = Vec::with_capacity(request.signatures.len());
    for signature in &request.signatures {
        if let Some(tx) = state.upstream.get_transaction(signature).await? {
            transactions.push(tx);
        }
    }

    let intents = state.intent.predict_batch(&transactions).await;
    let graph = request.build_graph.then(|| build_cooccurrence_graph(&transactions));

    Ok(Json(TraceResponse { transactions, intents, graph }))
}

/// Adjacent-pair account co-occurrence within each transaction (`ParsedTransaction`
/// carries no per-token-transfer detail to build a flow graph from here).
fn build_cooccurrence_graph(transactions: &[ParsedTransaction]) -> TraceGraph {
    let mut nodes: HashSet<String> = HashSet::new();
    let mut edges: HashSet<(String, String)> = HashSet::new();

    for tx in transactions {
        let pubkeys: Vec<&str> = tx.accounts.iter().map(|a| a.pubkey.as_str()).collect();
        for pubkey in &pubkeys {
            nodes.insert(pubkey.to_string());
        }
        for pair in pubkeys.windows(2) {
            let (a, b) = (pair[0].to_string(), pair[1].to_string());
            edges.insert(if a <= b { (a, b) } else { (b, a) });
        }
    }

    TraceGraph {
        nodes: nodes.into_iter().collect(),
        edges: edges.into_iter().map(|(a, b)| TraceEdge { a, b }).collect(),
    }
}
