//! Activity Classifier (spec §4.2): deterministic heuristics over an
//! enhanced transaction. Pure functions — no I/O, no mutation of the
//! Entity Registry — mirroring the shape of `validate::graph`'s pure
//! analysis over a parsed structure in the teacher.

use std::collections::{HashMap, HashSet};

use crate::model::amount::decimal_to_base_units;
use crate::model::{
    EnhancedTransaction, SwapDirection, SwapInfo, TokenTransfer, TxType, UpstreamTxTag,
};

/// Wrapped-SOL mint, excluded from `significant_mints` when its amount is
/// dust (<= 0.1), per spec §4.2 step 1.
const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Known DEX program IDs, seeded into the Entity Registry at startup
/// (spec §6) and consulted here for swap-metadata extraction (§4.2).
pub const KNOWN_DEX_PROGRAMS: &[(&str, &str)] = &[
    ("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8", "Raydium AMM"),
    ("9W959DqEETiGZocYWCQPaJ6sBmUzgfxXfqGeTEdp3aQP", "Orca Whirlpool"),
    ("EewxydAPCCVuNEyrVN68PuSYdQ7wKn27V9Gjeoi8dy3S", "Lifinity"),
    ("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4", "Jupiter Aggregator v6"),
    ("PhoeNiXZ8ByJGLkxNfZRnkUfjvmuYqLR89jjFHGqdXY", "Phoenix"),
];

fn known_dex_name(program_id: &str) -> Option<&'static str> {
    KNOWN_DEX_PROGRAMS
        .iter()
        .find(|(id, _)| *id == program_id)
        .map(|(_, name)| *name)
}

/// Distinct mints with a non-dust amount, excluding wrapped SOL at or below
/// 0.1 (spec §4.2 step 1).
fn significant_mints(token_transfers: &[TokenTransfer]) -> HashSet<String> {
    let mut mints = HashSet::new();
    for t in token_transfers {
        if t.mint == WRAPPED_SOL_MINT {
            let amount: f64 = t.token_amount.parse().unwrap_or(0.0);
            if amount <= 0.1 {
                continue;
            }
        }
        mints.insert(t.mint.clone());
    }
    mints
}

/// Transaction-type classification relative to a target mint (spec §4.2).
pub fn classify_tx_type(tx: &EnhancedTransaction, target_mint: &str) -> TxType {
    let _ = target_mint; // the target mint only matters for direction/filtering downstream
    let mints = significant_mints(&tx.token_transfers);

    if tx.tx_type == UpstreamTxTag::Transfer {
        return TxType::Transfer;
    }

    if mints.len() < 2 {
        // Single-mint movement routed through a DEX is still a transfer for
        // this mint, even if upstream tagged it SWAP.
        return TxType::Transfer;
    }

    let has_swap_event = tx.swap_event.is_some();
    let label_has_swap = tx.type_label.to_ascii_uppercase().contains("SWAP");
    if has_swap_event || label_has_swap || mints.len() >= 2 {
        return TxType::Swap;
    }

    TxType::Unknown
}

/// First writable signer — the fee payer (spec §4.2 "Swap direction").
fn fee_payer(tx: &EnhancedTransaction) -> Option<&str> {
    tx.accounts
        .iter()
        .find(|a| a.signer && a.writable)
        .map(|a| a.pubkey.as_str())
        .or(Some(tx.fee_payer.as_str()).filter(|s| !s.is_empty()))
}

/// Swap direction (`buy`/`sell`) of `target_mint` relative to the fee payer
/// (spec §4.2). Returns `None` if no signal is conclusive.
pub fn classify_swap_direction(tx: &EnhancedTransaction, target_mint: &str) -> Option<SwapDirection> {
    let payer = fee_payer(tx)?;

    for t in &tx.token_transfers {
        if t.mint != target_mint {
            continue;
        }
        if t.to_user_account == payer {
            return Some(SwapDirection::Buy);
        }
        if t.from_user_account == payer {
            return Some(SwapDirection::Sell);
        }
    }

    if let Some(event) = &tx.swap_event {
        if event.token_outputs.iter().any(|l| l.mint == target_mint) {
            return Some(SwapDirection::Buy);
        }
        if event.token_inputs.iter().any(|l| l.mint == target_mint) {
            return Some(SwapDirection::Sell);
        }
    }

    if let Some(native) = tx.native_transfers.first() {
        if native.from_user_account == payer {
            return Some(SwapDirection::Sell);
        }
        if native.to_user_account == payer {
            return Some(SwapDirection::Buy);
        }
    }

    None
}

/// Extract swap metadata (DEX name, token legs, amounts) (spec §4.2).
pub fn extract_swap_info(tx: &EnhancedTransaction) -> SwapInfo {
    let dex = tx
        .instructions
        .iter()
        .find_map(|ix| known_dex_name(&ix.program_id))
        .or_else(|| {
            tx.instructions
                .iter()
                .flat_map(|ix| ix.accounts.iter())
                .find_map(|acc| known_dex_name(acc))
        })
        .map(|s| s.to_string());

    let (token_in, amount_in) = tx
        .swap_event
        .as_ref()
        .and_then(|e| e.token_inputs.first())
        .map(|leg| {
            (
                Some(leg.mint.clone()),
                decimal_to_base_units(&leg.amount, token_decimals(tx, &leg.mint)),
            )
        })
        .unwrap_or((None, None));

    let (token_out, amount_out) = tx
        .swap_event
        .as_ref()
        .and_then(|e| e.token_outputs.first())
        .map(|leg| {
            (
                Some(leg.mint.clone()),
                decimal_to_base_units(&leg.amount, token_decimals(tx, &leg.mint)),
            )
        })
        .unwrap_or((None, None));

    SwapInfo {
        dex,
        token_in,
        token_out,
        amount_in,
        amount_out,
    }
}

fn token_decimals(tx: &EnhancedTransaction, mint: &str) -> u8 {
    tx.token_transfers
        .iter()
        .find(|t| t.mint == mint)
        .map(|t| t.decimals)
        .unwrap_or(0)
}

/// Batch-level liquidity-pool hub detection (spec §4.2). An address with
/// >= 10 unique counterparties AND >= 5 swap participations across the
/// batch is classified as a `pool` node. Pure: returns the set of pool
/// addresses, does not mutate the Entity Registry.
pub fn detect_liquidity_pools(transfers: &[crate::model::Transfer]) -> HashSet<String> {
    let mut counterparties: HashMap<String, HashSet<String>> = HashMap::new();
    let mut swap_participations: HashMap<String, u32> = HashMap::new();

    for t in transfers {
        counterparties
            .entry(t.from_address.clone())
            .or_default()
            .insert(t.to_address.clone());
        counterparties
            .entry(t.to_address.clone())
            .or_default()
            .insert(t.from_address.clone());

        if t.tx_type == TxType::Swap {
            *swap_participations.entry(t.from_address.clone()).or_insert(0) += 1;
            *swap_participations.entry(t.to_address.clone()).or_insert(0) += 1;
        }
    }

    counterparties
        .into_iter()
        .filter(|(addr, peers)| {
            peers.len() >= 10 && *swap_participations.get(addr).unwrap_or(&0) >= 5
        })
        .map(|(addr, _)| addr)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountEntry, Instruction, SwapEvent, SwapLeg};

    fn base_tx() -> EnhancedTransaction {
        EnhancedTransaction {
            signature: "sig1".into(),
            block_time: 1_000,
            tx_type: UpstreamTxTag::Unknown,
            type_label: "UNKNOWN".into(),
            fee_payer: "payer".into(),
            accounts: vec![AccountEntry {
                pubkey: "payer".into(),
                signer: true,
                writable: true,
            }],
            instructions: vec![],
            token_transfers: vec![],
            native_transfers: vec![],
            swap_event: None,
        }
    }

    #[test]
    fn single_mint_swap_label_is_transfer() {
        let mut tx = base_tx();
        tx.type_label = "SWAP".into();
        tx.token_transfers.push(TokenTransfer {
            mint: "MINT_A".into(),
            from_user_account: "pool".into(),
            to_user_account: "payer".into(),
            token_amount: "10".into(),
            decimals: 6,
        });
        assert_eq!(classify_tx_type(&tx, "MINT_A"), TxType::Transfer);
    }

    #[test]
    fn upstream_transfer_tag_always_wins() {
        let mut tx = base_tx();
        tx.tx_type = UpstreamTxTag::Transfer;
        tx.token_transfers.push(TokenTransfer {
            mint: "MINT_A".into(),
            from_user_account: "a".into(),
            to_user_account: "b".into(),
            token_amount: "1".into(),
            decimals: 6,
        });
        tx.token_transfers.push(TokenTransfer {
            mint: "MINT_B".into(),
            from_user_account: "b".into(),
            to_user_account: "a".into(),
            token_amount: "1".into(),
            decimals: 6,
        });
        assert_eq!(classify_tx_type(&tx, "MINT_A"), TxType::Transfer);
    }

    #[test]
    fn two_significant_mints_with_swap_event_is_swap() {
        let mut tx = base_tx();
        tx.type_label = "SWAP".into();
        tx.swap_event = Some(SwapEvent {
            token_inputs: vec![SwapLeg {
                mint: "USDC".into(),
                amount: "5".into(),
            }],
            token_outputs: vec![SwapLeg {
                mint: "MINT_A".into(),
                amount: "100".into(),
            }],
        });
        tx.token_transfers.push(TokenTransfer {
            mint: "MINT_A".into(),
            from_user_account: "pool".into(),
            to_user_account: "payer".into(),
            token_amount: "100".into(),
            decimals: 6,
        });
        tx.token_transfers.push(TokenTransfer {
            mint: "USDC".into(),
            from_user_account: "payer".into(),
            to_user_account: "pool".into(),
            token_amount: "5".into(),
            decimals: 6,
        });
        assert_eq!(classify_tx_type(&tx, "MINT_A"), TxType::Swap);
        assert_eq!(classify_swap_direction(&tx, "MINT_A"), Some(SwapDirection::Buy));
    }

    #[test]
    fn sell_direction_detected_from_debit() {
        let mut tx = base_tx();
        tx.token_transfers.push(TokenTransfer {
            mint: "MINT_A".into(),
            from_user_account: "payer".into(),
            to_user_account: "pool".into(),
            token_amount: "100".into(),
            decimals: 6,
        });
        tx.token_transfers.push(TokenTransfer {
            mint: "USDC".into(),
            from_user_account: "pool".into(),
            to_user_account: "payer".into(),
            token_amount: "5".into(),
            decimals: 6,
        });
        assert_eq!(classify_swap_direction(&tx, "MINT_A"), Some(SwapDirection::Sell));
    }

    #[test]
    fn extracts_known_dex_name() {
        let mut tx = base_tx();
        tx.instructions.push(Instruction {
            program_id: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".into(),
            accounts: vec![],
        });
        let info = extract_swap_info(&tx);
        assert_eq!(info.dex.as_deref(), Some("Raydium AMM"));
    }

    #[test]
    fn detects_pool_hub() {
        use crate::model::Amount;
        let mut transfers = Vec::new();
        for i in 0..12 {
            transfers.push(crate::model::Transfer {
                signature: format!("sig{i}"),
                from_address: "hub".into(),
                to_address: format!("user{i}"),
                token_mint: "MINT_A".into(),
                amount: Amount(1),
                decimals: 6,
                instruction_index: 0,
                block_time: i as i64,
                tx_type: TxType::Swap,
                swap_direction: None,
                swap_info: None,
            });
        }
        let pools = detect_liquidity_pools(&transfers);
        assert!(pools.contains("hub"));
        assert!(!pools.contains("user0"));
    }
}
