//! Flow Graph Engine (spec §4.3): bounded bidirectional DFS over token
//! transfers, amount aggregation, confidence scoring, and cycle detection.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use uuid::Uuid;

use crate::entities::EntityRegistry;
use crate::error::AppError;
use crate::model::{Amount, CircularFlow, EntityKind, FlowPath, PathNode, Transfer};
use crate::persistence::{Db, FlowPathDao};
use crate::upstream::UpstreamAdapter;

/// `maxDepth` is clamped to 10 at the boundary (spec §4.3).
pub const MAX_DEPTH_CAP: u32 = 10;
const MAX_VISITED: usize = 10_000;
const MAX_PATHS: usize = 1_000;
const TRANSFER_FETCH_LIMIT: usize = 500;
const CYCLE_MAX_DEPTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

pub struct FlowGraphEngine {
    upstream: Arc<UpstreamAdapter>,
    entities: Arc<EntityRegistry>,
    db: Db,
}

struct Traversal {
    visited: HashSet<String>,
    paths: Vec<FlowPath>,
    token_mint: String,
    max_depth: u32,
    since: Option<i64>,
    direction: Direction,
}

impl FlowGraphEngine {
    pub fn new(upstream: Arc<UpstreamAdapter>, entities: Arc<EntityRegistry>, db: Db) -> Self {
        FlowGraphEngine {
            upstream,
            entities,
            db,
        }
    }

    pub async fn build_forward_path(
        &self,
        start: &str,
        token_mint: &str,
        max_depth: u32,
        since: Option<i64>,
    ) -> Result<Vec<FlowPath>, AppError> {
        self.build_path(start, token_mint, max_depth, since, Direction::Forward)
            .await
    }

    pub async fn build_backward_path(
        &self,
        end: &str,
        token_mint: &str,
        max_depth: u32,
        since: Option<i64>,
    ) -> Result<Vec<FlowPath>, AppError> {
        self.build_path(end, token_mint, max_depth, since, Direction::Backward)
            .await
    }

    async fn build_path(
        &self,
        root: &str,
        token_mint: &str,
        max_depth: u32,
        since: Option<i64>,
        direction: Direction,
    ) -> Result<Vec<FlowPath>, AppError> {
        let mut traversal = Traversal {
            visited: HashSet::new(),
            paths: Vec::new(),
            token_mint: token_mint.to_string(),
            max_depth: max_depth.clamp(1, MAX_DEPTH_CAP),
            since,
            direction,
        };
        let mut hops = Vec::new();
        self.expand(root, Amount::ZERO, None, 0, &mut hops, &mut traversal)
            .await?;

        for path in &traversal.paths {
            // SHOULD, not MUST (spec §9 Open Question: persistence is a
            // deployment policy) — a write failure must not fail the read.
            let _ = FlowPathDao::upsert(&self.db, path, path_created_at(path)).await;
        }
        Ok(traversal.paths)
    }

    /// Recursion-local DFS expansion. `visited` is acquired on entry and
    /// released on every exit path (spec §9 "scoped-acquisition pattern").
    fn expand<'a>(
        &'a self,
        current: &'a str,
        amount_in: Amount,
        arrived_at: Option<i64>,
        depth: u32,
        hops: &'a mut Vec<PathNode>,
        traversal: &'a mut Traversal,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            if depth >= traversal.max_depth
                || traversal.visited.len() >= MAX_VISITED
                || traversal.paths.len() >= MAX_PATHS
            {
                self.emit_if_nonempty(hops, traversal);
                return Ok(());
            }
            if !traversal.visited.insert(current.to_string()) {
                self.emit_if_nonempty(hops, traversal);
                return Ok(());
            }

            let transfers = self
                .upstream
                .get_token_transfers(current, &traversal.token_mint, TRANSFER_FETCH_LIMIT)
                .await?;
            let aggregated = aggregate(&transfers, current, traversal.direction, traversal.since);

            let entity = self.entities.get(current).await?;
            let total_out: Amount = aggregated
                .values()
                .fold(Amount::ZERO, |acc, (amt, _)| acc.checked_add(*amt).unwrap_or(acc));

            hops.push(PathNode {
                address: current.to_string(),
                entity_kind: entity.as_ref().map(|e| e.entity_kind),
                entity_name: entity.as_ref().and_then(|e| e.name.clone()),
                amount_in,
                amount_out: total_out,
                timestamp: arrived_at,
            });

            if aggregated.is_empty() {
                self.emit_if_nonempty(hops, traversal);
            } else {
                for (dest, (amount, earliest_time)) in aggregated {
                    if traversal.paths.len() >= MAX_PATHS {
                        break;
                    }
                    self.expand(&dest, amount, Some(earliest_time), depth + 1, hops, traversal)
                        .await?;
                }
            }

            hops.pop();
            traversal.visited.remove(current);
            Ok(())
        })
    }

    fn emit_if_nonempty(&self, hops: &mut [PathNode], traversal: &mut Traversal) {
        if hops.is_empty() {
            return;
        }
        traversal.paths.push(self.finish_path(hops, &traversal.token_mint, traversal.direction));
    }

    fn finish_path(&self, hops: &[PathNode], token_mint: &str, direction: Direction) -> FlowPath {
        let ordered: Vec<PathNode> = match direction {
            Direction::Forward => hops.to_vec(),
            Direction::Backward => {
                let mut reversed = hops.to_vec();
                reversed.reverse();
                reversed
            }
        };
        let total_amount = ordered
            .iter()
            .skip(1)
            .fold(Amount::ZERO, |acc, h| acc.checked_add(h.amount_in).unwrap_or(acc));
        let confidence = confidence_score(&ordered);

        FlowPath {
            path_id: Uuid::new_v4(),
            start_address: ordered.first().map(|h| h.address.clone()).unwrap_or_default(),
            end_address: ordered.last().map(|h| h.address.clone()).unwrap_or_default(),
            token_mint: token_mint.to_string(),
            hops: ordered,
            total_amount,
            confidence_score: confidence,
            intent: None,
            intent_confidence: None,
            risk_score: None,
            risk_level: None,
        }
    }

    /// `detectCircularFlows(address, tokenMint)` (spec §4.3). Walks outgoing
    /// transfers node by node (the same recursion-local visited discipline
    /// as path expansion) until a branch loops back to `address`.
    pub async fn detect_circular_flows(
        &self,
        address: &str,
        token_mint: &str,
    ) -> Result<Vec<CircularFlow>, AppError> {
        let mut cycles: Vec<(Vec<String>, Amount)> = Vec::new();
        let mut path = vec![address.to_string()];
        let mut on_path: HashSet<String> = HashSet::from([address.to_string()]);
        self.find_cycles(address, address, token_mint, &mut path, &mut on_path, &mut cycles, CYCLE_MAX_DEPTH)
            .await?;

        Ok(cycles
            .into_iter()
            .map(|(addresses, total_amount)| CircularFlow {
                cycle_count: (addresses.len() - 1) as u32,
                addresses,
                total_amount,
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn find_cycles<'a>(
        &'a self,
        start: &'a str,
        current: &'a str,
        token_mint: &'a str,
        path: &'a mut Vec<String>,
        on_path: &'a mut HashSet<String>,
        cycles: &'a mut Vec<(Vec<String>, Amount)>,
        remaining_depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            if remaining_depth == 0 {
                return Ok(());
            }
            let transfers = self
                .upstream
                .get_token_transfers(current, token_mint, TRANSFER_FETCH_LIMIT)
                .await?;
            let aggregated = aggregate(&transfers, current, Direction::Forward, None);

            for (next, (amount, _)) in aggregated {
                if next == start && path.len() > 2 {
                    let mut cycle = path.clone();
                    cycle.push(start.to_string());
                    cycles.push((cycle, amount));
                    continue;
                }
                if on_path.contains(&next) {
                    continue;
                }
                path.push(next.clone());
                on_path.insert(next.clone());
                self.find_cycles(start, &next, token_mint, path, on_path, cycles, remaining_depth - 1)
                    .await?;
                on_path.remove(&next);
                path.pop();
            }
            Ok(())
        })
    }
}

fn path_created_at(path: &FlowPath) -> i64 {
    path.hops.iter().filter_map(|h| h.timestamp).max().unwrap_or(0)
}

/// Aggregates transfers touching `node` by the *other* endpoint, summing
/// amounts and keeping the earliest `blockTime` as the hop timestamp
/// (spec §4.3 "Aggregate transfers by destination address").
fn aggregate(
    transfers: &[Transfer],
    node: &str,
    direction: Direction,
    since: Option<i64>,
) -> HashMap<String, (Amount, i64)> {
    let mut out: HashMap<String, (Amount, i64)> = HashMap::new();
    for t in transfers {
        if let Some(since) = since {
            if t.block_time < since {
                continue;
            }
        }
        let other = match direction {
            Direction::Forward if t.from_address == node => &t.to_address,
            Direction::Backward if t.to_address == node => &t.from_address,
            _ => continue,
        };
        let entry = out.entry(other.clone()).or_insert((Amount::ZERO, t.block_time));
        entry.0 = entry.0.checked_add(t.amount).unwrap_or(entry.0);
        entry.1 = entry.1.min(t.block_time);
    }
    out
}

/// Multiplicative confidence scoring (spec §4.3).
fn confidence_score(hops: &[PathNode]) -> f64 {
    let mut score = 1.0f64;
    for i in 1..hops.len() {
        let prev_out = hops[i - 1].amount_out;
        let curr_in = hops[i].amount_in;
        let ratio = prev_out.ratio(curr_in);
        score *= if (0.95..=1.05).contains(&ratio) {
            1.0
        } else if (0.90..=1.10).contains(&ratio) {
            0.95
        } else if (0.80..=1.20).contains(&ratio) {
            0.85
        } else {
            0.70
        };

        if i < hops.len() - 1 && hops[i].entity_kind == Some(EntityKind::Dex) {
            score *= 0.98;
        }

        if let (Some(prev_ts), Some(curr_ts)) = (hops[i - 1].timestamp, hops[i].timestamp) {
            if (curr_ts - prev_ts).abs() > 24 * 3600 {
                score *= 0.9;
            }
        }
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::model::{AccountEntry, EnhancedTransaction, UpstreamTxTag};
    use crate::upstream::{Pagination, RpcProvider, SignatureEntry, TokenAccountEntry};
    use async_trait::async_trait;

    struct ChainProvider {
        edges: Vec<(&'static str, &'static str, &'static str, i64)>,
    }

    #[async_trait]
    impl RpcProvider for ChainProvider {
        async fn get_transaction(&self, _s: &str) -> Result<Option<EnhancedTransaction>, AppError> {
            Ok(None)
        }
        async fn get_signatures_for_address(
            &self,
            address: &str,
            p: &Pagination,
        ) -> Result<Vec<SignatureEntry>, AppError> {
            // Single-page fake: any `before` cursor means "end of history".
            if p.before.is_some() {
                return Ok(vec![]);
            }
            Ok(self
                .edges
                .iter()
                .filter(|(from, to, _, _)| from == &address || to == &address)
                .map(|(from, to, _, t)| SignatureEntry {
                    signature: format!("{from}->{to}"),
                    block_time: Some(*t),
                })
                .collect())
        }
        async fn get_transactions_batch(
            &self,
            signatures: &[String],
        ) -> Result<Vec<EnhancedTransaction>, AppError> {
            Ok(self
                .edges
                .iter()
                .filter(|(from, to, _, _)| signatures.contains(&format!("{from}->{to}")))
                .map(|(from, to, mint, t)| enhanced(from, to, mint, "1000000", *t))
                .collect())
        }
        async fn get_signatures_for_mint(
            &self,
            _mint: &str,
            _page_size: usize,
            _before: Option<&str>,
        ) -> Result<Vec<SignatureEntry>, AppError> {
            Ok(vec![])
        }
        async fn get_largest_token_accounts(
            &self,
            _mint: &str,
        ) -> Result<Vec<TokenAccountEntry>, AppError> {
            Ok(vec![])
        }
    }

    fn enhanced(from: &str, to: &str, mint: &str, amount: &str, block_time: i64) -> EnhancedTransaction {
        EnhancedTransaction {
            signature: format!("{from}->{to}"),
            block_time,
            tx_type: UpstreamTxTag::Transfer,
            type_label: "TRANSFER".into(),
            fee_payer: from.into(),
            accounts: vec![AccountEntry {
                pubkey: from.into(),
                signer: true,
                writable: true,
            }],
            instructions: vec![],
            token_transfers: vec![crate::model::TokenTransfer {
                mint: mint.into(),
                from_user_account: from.into(),
                to_user_account: to.into(),
                token_amount: amount.into(),
                decimals: 6,
            }],
            native_transfers: vec![],
            swap_event: None,
        }
    }

    async fn engine_for(edges: Vec<(&'static str, &'static str, &'static str, i64)>) -> FlowGraphEngine {
        let provider = Arc::new(ChainProvider { edges });
        let cache = Arc::new(InMemoryCache::new());
        let upstream = Arc::new(UpstreamAdapter::new(provider, cache));
        let db = crate::persistence::open_in_memory().unwrap();
        let entities = Arc::new(EntityRegistry::load(db.clone()).await.unwrap());
        FlowGraphEngine::new(upstream, entities, db)
    }

    #[tokio::test]
    async fn straight_chain_has_high_confidence() {
        let engine = engine_for(vec![
            ("A", "B", "MINT", 100),
            ("B", "C", "MINT", 200),
            ("C", "D", "MINT", 300),
            ("D", "E", "MINT", 400),
        ])
        .await;

        let paths = engine.build_forward_path("A", "MINT", 5, None).await.unwrap();
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert_eq!(path.hop_count(), 5);
        assert_eq!(path.start_address, "A");
        assert_eq!(path.end_address, "E");
        assert!(path.confidence_score > 0.99);
    }

    #[tokio::test]
    async fn detects_three_node_cycle() {
        let engine = engine_for(vec![
            ("A", "B", "MINT", 100),
            ("B", "C", "MINT", 200),
            ("C", "A", "MINT", 300),
        ])
        .await;

        let cycles = engine.detect_circular_flows("A", "MINT").await.unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].addresses, vec!["A", "B", "C", "A"]);
    }
}
