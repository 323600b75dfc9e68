//! Flow-path records produced by the Flow Graph Engine (spec §3/§4.3).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount::Amount;
use super::entity::{EntityKind, RiskLevel};

/// One hop in a reconstructed flow path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    pub address: String,
    pub entity_kind: Option<EntityKind>,
    pub entity_name: Option<String>,
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub timestamp: Option<i64>,
}

/// A canonical reconstructed token-flow path.
///
/// Invariant: `hop_count == hops.len()` and `hop_count >= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowPath {
    pub path_id: Uuid,
    pub start_address: String,
    pub end_address: String,
    pub token_mint: String,
    pub hops: Vec<PathNode>,
    pub total_amount: Amount,
    pub confidence_score: f64,
    pub intent: Option<String>,
    pub intent_confidence: Option<f64>,
    pub risk_score: Option<u8>,
    pub risk_level: Option<RiskLevel>,
}

impl FlowPath {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

/// A detected cycle in the transfer graph (spec §4.3 / GLOSSARY "Circular flow").
///
/// Invariant: `addresses.first() == addresses.last()` and `addresses.len() > 2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularFlow {
    pub addresses: Vec<String>,
    pub total_amount: Amount,
    pub cycle_count: u32,
}
