//! Transfer and parsed-transaction records (spec §3).

use serde::{Deserialize, Serialize};

use super::amount::Amount;

/// Transaction-type classification applied by the Activity Classifier (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Transfer,
    Swap,
    Unknown,
}

/// Swap direction relative to the target mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    Buy,
    Sell,
}

/// Extracted swap metadata (§4.2 "Swap metadata extraction").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapInfo {
    pub dex: Option<String>,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub amount_in: Option<Amount>,
    pub amount_out: Option<Amount>,
}

/// A single token movement, immutable once parsed.
///
/// Invariant: `from_address != to_address` is *not* guaranteed — self
/// transfers are legal and must round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub signature: String,
    pub from_address: String,
    pub to_address: String,
    pub token_mint: String,
    pub amount: Amount,
    pub decimals: u8,
    pub instruction_index: u32,
    pub block_time: i64,
    pub tx_type: TxType,
    pub swap_direction: Option<SwapDirection>,
    pub swap_info: Option<SwapInfo>,
}

/// An account entry inside a parsed transaction, ordered as returned by the
/// upstream (writable signers first — see §4.2 fee-payer resolution).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub pubkey: String,
    pub signer: bool,
    pub writable: bool,
}

/// An opaque, already-decoded instruction. The classifier inspects
/// `program_id` and `accounts`; instruction-specific payload decoding is a
/// concern of the upstream parser, not of this model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: String,
    pub accounts: Vec<String>,
}

/// A token-balance delta as reported by the enhanced-transaction payload,
/// prior to mint-filtering / classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub mint: String,
    pub from_user_account: String,
    pub to_user_account: String,
    /// Decimal-notation amount as reported upstream (e.g. `"12.5"`).
    pub token_amount: String,
    pub decimals: u8,
}

/// A native SOL transfer entry, used as a fallback source for fee-payer and
/// swap-direction resolution when no token-level signal is conclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeTransfer {
    pub from_user_account: String,
    pub to_user_account: String,
    pub amount_lamports: u64,
}

/// Upstream's own coarse tag for the transaction (`TRANSFER`, `SWAP`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpstreamTxTag {
    Transfer,
    Swap,
    Unknown,
}

/// A token leg of a decoded swap event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapLeg {
    pub mint: String,
    pub amount: String,
}

/// A decoded swap event, when the upstream parser recognized one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SwapEvent {
    pub token_inputs: Vec<SwapLeg>,
    pub token_outputs: Vec<SwapLeg>,
}

/// The enhanced-transaction payload the Activity Classifier consumes.
/// This is the "heterogeneous record with explicit discriminants" of
/// SPEC_FULL §A: `tx_type` is the required discriminant, rejected with
/// `UpstreamBadResponse` (see `upstream::error`) if unrecognized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedTransaction {
    pub signature: String,
    pub block_time: i64,
    pub tx_type: UpstreamTxTag,
    /// Free-text type label, e.g. `"SWAP"`, `"UNKNOWN"`; consulted when
    /// `tx_type` is not decisive (§4.2 step 4, "type contains SWAP").
    pub type_label: String,
    pub fee_payer: String,
    pub accounts: Vec<AccountEntry>,
    pub instructions: Vec<Instruction>,
    pub token_transfers: Vec<TokenTransfer>,
    pub native_transfers: Vec<NativeTransfer>,
    pub swap_event: Option<SwapEvent>,
}

/// A fully parsed transaction (spec §3 `ParsedTransaction`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub signature: String,
    pub block_time: i64,
    pub slot: u64,
    pub fee: u64,
    pub success: bool,
    pub accounts: Vec<AccountEntry>,
    pub instructions: Vec<Instruction>,
}
