//! Risk Scoring Engine (spec §4.4): composite proximity-based risk score,
//! cached for ten minutes and persisted as an `Entity` + `RiskFlag` history.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheExt};
use crate::entities::EntityRegistry;
use crate::error::AppError;
use crate::flowgraph::FlowGraphEngine;
use crate::model::{
    Entity, EntityKind, FlagSeverity, RiskAssessment, RiskFlag, RiskFlagKind, RiskLevel, Transfer,
};
use crate::persistence::{Db, RiskFlagDao};
use crate::upstream::UpstreamAdapter;

const ASSESSMENT_CACHE_TTL: Duration = Duration::from_secs(600);
const PROXIMITY_MAX_HOPS: u32 = 2;
const PROXIMITY_FANOUT: usize = 10;
const TRANSFER_FETCH_LIMIT: usize = 500;
const PEEL_CHAIN_MIN_LENGTH: usize = 3;
const PEEL_CHAIN_RATIO_LOW: f64 = 0.85;
const PEEL_CHAIN_RATIO_HIGH: f64 = 0.95;
const VELOCITY_THRESHOLD_PER_HOUR: usize = 100;

const SCORE_SANCTIONED_DIRECT: u8 = 100;
const SCORE_SANCTIONED_PROXIMITY: u8 = 50;
const SCORE_MIXER_PROXIMITY: u8 = 40;
const SCORE_PEEL_CHAIN: u8 = 35;
const SCORE_CIRCULAR_FLOW: u8 = 25;
const SCORE_VELOCITY: u8 = 20;

pub struct RiskEngine {
    upstream: Arc<UpstreamAdapter>,
    entities: Arc<EntityRegistry>,
    flowgraph: Arc<FlowGraphEngine>,
    cache: Arc<dyn Cache>,
    db: Db,
}

impl RiskEngine {
    pub fn new(
        upstream: Arc<UpstreamAdapter>,
        entities: Arc<EntityRegistry>,
        flowgraph: Arc<FlowGraphEngine>,
        cache: Arc<dyn Cache>,
        db: Db,
    ) -> Self {
        RiskEngine {
            upstream,
            entities,
            flowgraph,
            cache,
            db,
        }
    }

    pub async fn assess_risk(&self, address: &str, token_mint: &str) -> Result<RiskAssessment, AppError> {
        let cache_key = format!("risk:{address}:{token_mint}");
        if let Some(cached) = self.cache.get_json::<RiskAssessment>(&cache_key).await {
            return Ok(cached);
        }

        let assessment = self.compute(address, token_mint).await?;
        self.persist(&assessment).await?;
        self.cache.set_json(&cache_key, &assessment, ASSESSMENT_CACHE_TTL).await;
        Ok(assessment)
    }

    async fn compute(&self, address: &str, token_mint: &str) -> Result<RiskAssessment, AppError> {
        let now = chrono::Utc::now().timestamp();

        if self.entities.is_sanctioned(address) {
            return Ok(RiskAssessment {
                address: address.to_string(),
                risk_score: SCORE_SANCTIONED_DIRECT,
                risk_level: RiskLevel::from_score(SCORE_SANCTIONED_DIRECT),
                flags: vec![RiskFlag {
                    kind: RiskFlagKind::SanctionedDirect,
                    severity: FlagSeverity::Critical,
                    detail: serde_json::json!({ "address": address }),
                }],
                last_assessed: now,
            });
        }

        let mut score: u32 = 0;
        let mut flags = Vec::new();

        if let Some(hit) = self.proximity_search(address, token_mint, |a| self.entities.is_sanctioned(a)).await? {
            score += SCORE_SANCTIONED_PROXIMITY as u32;
            flags.push(RiskFlag {
                kind: RiskFlagKind::SanctionedProximity,
                severity: FlagSeverity::Critical,
                detail: serde_json::json!({ "hop": hit.0, "address": hit.1 }),
            });
        }

        if let Some(hit) = self.proximity_search(address, token_mint, |a| self.entities.is_mixer(a)).await? {
            score += SCORE_MIXER_PROXIMITY as u32;
            flags.push(RiskFlag {
                kind: RiskFlagKind::MixerProximity,
                severity: FlagSeverity::Critical,
                detail: serde_json::json!({ "hop": hit.0, "address": hit.1 }),
            });
        }

        let outgoing = self.upstream.get_token_transfers(address, token_mint, TRANSFER_FETCH_LIMIT).await?;

        if let Some(chain_len) = peel_chain_length(&outgoing, address) {
            score += SCORE_PEEL_CHAIN as u32;
            flags.push(RiskFlag {
                kind: RiskFlagKind::PeelChain,
                severity: FlagSeverity::Warning,
                detail: serde_json::json!({ "chain_length": chain_len }),
            });
        }

        let cycles = self.flowgraph.detect_circular_flows(address, token_mint).await?;
        if !cycles.is_empty() {
            score += SCORE_CIRCULAR_FLOW as u32;
            flags.push(RiskFlag {
                kind: RiskFlagKind::CircularFlow,
                severity: FlagSeverity::Warning,
                detail: serde_json::json!({ "cycle_count": cycles.len() }),
            });
        }

        if let Some(per_hour) = velocity_per_hour(&outgoing, address) {
            if per_hour > VELOCITY_THRESHOLD_PER_HOUR {
                score += SCORE_VELOCITY as u32;
                flags.push(RiskFlag {
                    kind: RiskFlagKind::Velocity,
                    severity: FlagSeverity::Warning,
                    detail: serde_json::json!({ "transfers_per_hour": per_hour }),
                });
            }
        }

        let score = score.min(100) as u8;
        Ok(RiskAssessment {
            address: address.to_string(),
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            flags,
            last_assessed: now,
        })
    }

    /// Bounded BFS over outgoing transfers, depth ≤ 2, fan-out ≤ 10 per
    /// node (spec §4.4). Returns the hop distance and matching address of
    /// the first node satisfying `predicate`, if any.
    async fn proximity_search(
        &self,
        start: &str,
        token_mint: &str,
        predicate: impl Fn(&str) -> bool,
    ) -> Result<Option<(u32, String)>, AppError> {
        let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
        let mut queue: VecDeque<(String, u32)> = VecDeque::from([(start.to_string(), 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= PROXIMITY_MAX_HOPS {
                continue;
            }
            let transfers = self.upstream.get_token_transfers(&current, token_mint, TRANSFER_FETCH_LIMIT).await?;
            let mut neighbors: Vec<&str> = transfers
                .iter()
                .filter(|t| t.from_address == current)
                .map(|t| t.to_address.as_str())
                .collect();
            neighbors.dedup();
            neighbors.truncate(PROXIMITY_FANOUT);

            for neighbor in neighbors {
                if predicate(neighbor) {
                    return Ok(Some((depth + 1, neighbor.to_string())));
                }
                if visited.insert(neighbor.to_string()) {
                    queue.push_back((neighbor.to_string(), depth + 1));
                }
            }
        }
        Ok(None)
    }

    async fn persist(&self, assessment: &RiskAssessment) -> Result<(), AppError> {
        let mut entity = self
            .entities
            .get(&assessment.address)
            .await?
            .unwrap_or(Entity {
                address: assessment.address.clone(),
                entity_kind: EntityKind::Wallet,
                name: None,
                risk_level: assessment.risk_level,
                risk_score: assessment.risk_score,
                metadata: serde_json::Value::Null,
            });
        entity.risk_level = assessment.risk_level;
        entity.risk_score = assessment.risk_score;
        self.entities.upsert(entity).await?;

        for flag in &assessment.flags {
            RiskFlagDao::insert(&self.db, &assessment.address, flag, assessment.last_assessed).await?;
        }
        Ok(())
    }
}

/// Detects three-or-more consecutive outbound *transitions* whose amount
/// ratio stays within the peel-chain band (spec §4.4, GLOSSARY "Peel
/// chain"). `chainLength` counts transitions, not transfers: three qualifying
/// ratios in a row (four transfers) is `chainLength = 3`.
fn peel_chain_length(outgoing: &[Transfer], address: &str) -> Option<usize> {
    let mut chain: Vec<&Transfer> = outgoing.iter().filter(|t| t.from_address == address).collect();
    chain.sort_by_key(|t| t.block_time);

    let mut run = 0usize;
    let mut best = 0usize;
    for window in chain.windows(2) {
        let ratio = window[1].amount.ratio(window[0].amount);
        if (PEEL_CHAIN_RATIO_LOW..=PEEL_CHAIN_RATIO_HIGH).contains(&ratio) {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    (best >= PEEL_CHAIN_MIN_LENGTH).then_some(best)
}

/// Outbound transfer rate in the busiest single hour present in the sample
/// (spec §4.4 "velocity: more than 100 outbound transfers in any one-hour
/// window").
fn velocity_per_hour(outgoing: &[Transfer], address: &str) -> Option<usize> {
    let mut timestamps: Vec<i64> = outgoing
        .iter()
        .filter(|t| t.from_address == address)
        .map(|t| t.block_time)
        .collect();
    if timestamps.is_empty() {
        return None;
    }
    timestamps.sort_unstable();

    let mut max_count = 0usize;
    let mut window_start = 0usize;
    for i in 0..timestamps.len() {
        while timestamps[i] - timestamps[window_start] > 3600 {
            window_start += 1;
        }
        max_count = max_count.max(i - window_start + 1);
    }
    Some(max_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;

    fn transfer(from: &str, to: &str, amount: u128, block_time: i64) -> Transfer {
        Transfer {
            signature: format!("{from}-{to}-{block_time}"),
            from_address: from.to_string(),
            to_address: to.to_string(),
            token_mint: "MINT".into(),
            amount: Amount(amount),
            decimals: 6,
            instruction_index: 0,
            block_time,
            tx_type: crate::model::TxType::Transfer,
            swap_direction: None,
            swap_info: None,
        }
    }

    #[test]
    fn detects_peel_chain() {
        let transfers = vec![
            transfer("A", "B1", 1_000_000, 0),
            transfer("A", "B2", 920_000, 100),
            transfer("A", "B3", 850_000, 200),
            transfer("A", "B4", 780_000, 300),
        ];
        assert_eq!(peel_chain_length(&transfers, "A"), Some(3));
    }

    #[test]
    fn rejects_chain_outside_ratio_band() {
        let transfers = vec![
            transfer("A", "B1", 1_000_000, 0),
            transfer("A", "B2", 500_000, 100),
            transfer("A", "B3", 490_000, 200),
        ];
        assert_eq!(peel_chain_length(&transfers, "A"), None);
    }

    #[test]
    fn computes_velocity_over_busiest_hour() {
        let mut transfers = Vec::new();
        for i in 0..120 {
            transfers.push(transfer("A", "X", 1, i * 10));
        }
        assert!(velocity_per_hour(&transfers, "A").unwrap() > VELOCITY_THRESHOLD_PER_HOUR);
    }
}
