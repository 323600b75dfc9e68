//! Wire-level types for the upstream RPC / enhanced-transactions provider.

use serde::Deserialize;

/// Pagination window for `getAddressTransactions` (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub limit: usize,
    pub before: Option<String>,
    pub until: Option<String>,
}

/// A signature entry from the paginated RPC signature-list call.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureEntry {
    pub signature: String,
    pub block_time: Option<i64>,
}

/// A token-account entry from the "largest accounts" RPC call, used by the
/// `getRecentTokenActivity` fallback pass (spec §4.1 step 2).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenAccountEntry {
    pub address: String,
    pub owner: String,
    pub amount: String,
}
