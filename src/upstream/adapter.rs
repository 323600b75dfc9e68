//! `UpstreamAdapter` (spec §4.1): the four public operations, each wrapped
//! in retry + circuit breaker, with the cache TTLs the spec pins down.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::{Cache, CacheExt};
use crate::classifier;
use crate::error::AppError;
use crate::model::amount::decimal_to_base_units;
use crate::model::{EnhancedTransaction, ParsedTransaction, Transfer, TxType};

use super::provider::RpcProvider;
use super::retry::{retry, RetryPolicy};
use super::types::{Pagination, SignatureEntry};
use super::CircuitBreaker;

const TX_CACHE_TTL: Duration = Duration::from_secs(3600);
const TOKEN_TRANSFERS_CACHE_TTL: Duration = Duration::from_secs(300);
const RECENT_ACTIVITY_CACHE_TTL: Duration = Duration::from_secs(120);
const NEGATIVE_RESULT_TTL: Duration = Duration::from_secs(60);

const MINT_SIGNATURE_PAGE_SIZE: usize = 1000;
const TRANSACTION_BATCH_SIZE: usize = 10;
const FALLBACK_TOP_ACCOUNTS: usize = 3;

pub struct UpstreamAdapter {
    provider: Arc<dyn RpcProvider>,
    cache: Arc<dyn Cache>,
    breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
}

impl UpstreamAdapter {
    pub fn new(provider: Arc<dyn RpcProvider>, cache: Arc<dyn Cache>) -> Self {
        UpstreamAdapter {
            provider,
            cache,
            breaker: CircuitBreaker::new(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Runs `f` through the circuit breaker and retry policy together.
    async fn guarded<T, F, Fut>(&self, f: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        if !self.breaker.allow().await {
            return Err(AppError::UpstreamUnavailable(
                "circuit breaker open".into(),
            ));
        }
        let result = retry(&self.retry_policy, f).await;
        match &result {
            Ok(_) => self.breaker.record_success().await,
            Err(AppError::UpstreamBadResponse(_)) => {}
            Err(_) => self.breaker.record_failure().await,
        }
        result
    }

    // ── getTransaction ──────────────────────────────────────────────

    pub async fn get_transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>, AppError> {
        let cache_key = format!("upstream:tx:{signature}");
        if let Some(cached) = self.cache.get_json::<Option<ParsedTransaction>>(&cache_key).await {
            return Ok(cached);
        }

        let tx = self
            .guarded(|| self.provider.get_transaction(signature))
            .await?
            .map(enhanced_to_parsed);

        let ttl = if tx.is_some() { TX_CACHE_TTL } else { NEGATIVE_RESULT_TTL };
        self.cache.set_json(&cache_key, &tx, ttl).await;
        Ok(tx)
    }

    // ── getAddressTransactions ──────────────────────────────────────

    pub async fn get_address_transactions(
        &self,
        address: &str,
        pagination: Pagination,
    ) -> Result<Vec<ParsedTransaction>, AppError> {
        let limit = pagination.limit;
        let signatures = self.paginate_signatures(address, &pagination).await?;
        let sigs: Vec<String> = signatures.into_iter().map(|s| s.signature).take(limit).collect();
        let txs = self.resolve_batches(&sigs).await?;
        Ok(txs.into_iter().map(enhanced_to_parsed).take(limit).collect())
    }

    async fn paginate_signatures(
        &self,
        address: &str,
        pagination: &Pagination,
    ) -> Result<Vec<SignatureEntry>, AppError> {
        let mut collected = Vec::new();
        let mut before = pagination.before.clone();
        while collected.len() < pagination.limit {
            let page_limit = (pagination.limit - collected.len()).min(1000);
            let before_now = before.clone();
            let page = self
                .guarded(|| {
                    let p = Pagination {
                        limit: page_limit,
                        before: before_now.clone(),
                        until: pagination.until.clone(),
                    };
                    async move { self.provider.get_signatures_for_address(address, &p).await }
                })
                .await?;
            if page.is_empty() {
                break;
            }
            before = page.last().map(|e| e.signature.clone());
            collected.extend(page);
        }
        Ok(collected)
    }

    async fn resolve_batches(&self, signatures: &[String]) -> Result<Vec<EnhancedTransaction>, AppError> {
        let mut out = Vec::with_capacity(signatures.len());
        for batch in signatures.chunks(TRANSACTION_BATCH_SIZE) {
            let batch = batch.to_vec();
            let resolved = self
                .guarded(|| {
                    let batch = batch.clone();
                    async move { self.provider.get_transactions_batch(&batch).await }
                })
                .await?;
            out.extend(resolved);
        }
        Ok(out)
    }

    // ── getTokenTransfers ─────────────────────────────────────────────

    pub async fn get_token_transfers(
        &self,
        address: &str,
        token_mint: &str,
        limit: usize,
    ) -> Result<Vec<Transfer>, AppError> {
        let cache_key = format!("upstream:transfers:{address}:{token_mint}:{limit}");
        if let Some(cached) = self.cache.get_json::<Vec<Transfer>>(&cache_key).await {
            return Ok(cached);
        }

        let pagination = Pagination {
            limit,
            before: None,
            until: None,
        };
        let signatures = self.paginate_signatures(address, &pagination).await?;
        let sigs: Vec<String> = signatures.into_iter().map(|s| s.signature).collect();
        let txs = self.resolve_batches(&sigs).await?;

        let mut transfers = Vec::new();
        for tx in &txs {
            transfers.extend(transfers_for_mint(tx, token_mint));
        }
        transfers.truncate(limit);

        self.cache
            .set_json(&cache_key, &transfers, TOKEN_TRANSFERS_CACHE_TTL)
            .await;
        Ok(transfers)
    }

    // ── getRecentTokenActivity ─────────────────────────────────────────

    pub async fn get_recent_token_activity(
        &self,
        token_mint: &str,
        limit: usize,
    ) -> Result<Vec<Transfer>, AppError> {
        let cache_key = format!("upstream:activity:{token_mint}:{limit}");
        if let Some(cached) = self.cache.get_json::<Vec<Transfer>>(&cache_key).await {
            return Ok(cached);
        }

        let mut transfers = self.recent_activity_primary(token_mint, limit).await?;
        if transfers.is_empty() {
            transfers = self.recent_activity_fallback(token_mint, limit).await?;
        }

        transfers.sort_by(|a, b| b.block_time.cmp(&a.block_time));
        transfers.truncate(limit);

        self.cache
            .set_json(&cache_key, &transfers, RECENT_ACTIVITY_CACHE_TTL)
            .await;
        Ok(transfers)
    }

    /// Primary pass: signatures for the mint, resolved in batches, one
    /// Transfer emitted per matching `tokenTransfer` (spec §4.1 step 1).
    async fn recent_activity_primary(
        &self,
        token_mint: &str,
        limit: usize,
    ) -> Result<Vec<Transfer>, AppError> {
        let mut all_sigs = Vec::new();
        let mut before: Option<String> = None;
        while all_sigs.len() < limit {
            let page = self
                .guarded(|| {
                    let before = before.clone();
                    async move {
                        self.provider
                            .get_signatures_for_mint(token_mint, MINT_SIGNATURE_PAGE_SIZE, before.as_deref())
                            .await
                    }
                })
                .await?;
            if page.is_empty() {
                break;
            }
            before = page.last().map(|e| e.signature.clone());
            all_sigs.extend(page);
        }
        let sigs: Vec<String> = all_sigs.into_iter().map(|s| s.signature).collect();
        let txs = self.resolve_batches(&sigs).await?;

        let mut transfers = Vec::new();
        for tx in &txs {
            transfers.extend(transfers_for_mint(tx, token_mint));
        }
        Ok(transfers)
    }

    /// Fallback pass: walk the top three largest token accounts' owners
    /// (spec §4.1 step 2), de-duplicating by `(signature, fromAddress)`.
    async fn recent_activity_fallback(
        &self,
        token_mint: &str,
        limit: usize,
    ) -> Result<Vec<Transfer>, AppError> {
        let accounts = self
            .guarded(|| self.provider.get_largest_token_accounts(token_mint))
            .await?;

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut transfers = Vec::new();

        for account in accounts.into_iter().take(FALLBACK_TOP_ACCOUNTS) {
            let owner_transfers = match self
                .get_token_transfers(&account.owner, token_mint, limit)
                .await
            {
                Ok(t) => t,
                Err(e) => {
                    warn!(owner = %account.owner, error = %e, "fallback owner walk failed");
                    continue;
                }
            };
            for t in owner_transfers {
                let key = (t.signature.clone(), t.from_address.clone());
                if seen.insert(key) {
                    transfers.push(t);
                }
            }
        }
        Ok(transfers)
    }
}

/// Flatten an enhanced transaction's token transfers matching `mint` into
/// `Transfer` records, classifying the transaction once and reusing the
/// verdict across every matching leg (spec §4.1 step 1: "apply the
/// Activity Classifier once").
fn transfers_for_mint(tx: &EnhancedTransaction, mint: &str) -> Vec<Transfer> {
    let tx_type = classifier::classify_tx_type(tx, mint);
    let swap_direction = if tx_type == TxType::Swap {
        classifier::classify_swap_direction(tx, mint)
    } else {
        None
    };
    let swap_info = if tx_type == TxType::Swap {
        Some(classifier::extract_swap_info(tx))
    } else {
        None
    };

    tx.token_transfers
        .iter()
        .enumerate()
        .filter(|(_, t)| t.mint == mint)
        .filter_map(|(idx, t)| {
            let amount = decimal_to_base_units(&t.token_amount, t.decimals)?;
            Some(Transfer {
                signature: tx.signature.clone(),
                from_address: t.from_user_account.clone(),
                to_address: t.to_user_account.clone(),
                token_mint: mint.to_string(),
                amount,
                decimals: t.decimals,
                instruction_index: idx as u32,
                block_time: tx.block_time,
                tx_type,
                swap_direction,
                swap_info: swap_info.clone(),
            })
        })
        .collect()
}

fn enhanced_to_parsed(tx: EnhancedTransaction) -> ParsedTransaction {
    ParsedTransaction {
        signature: tx.signature,
        block_time: tx.block_time,
        slot: 0,
        fee: 0,
        success: true,
        accounts: tx.accounts,
        instructions: tx.instructions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::model::{AccountEntry, UpstreamTxTag};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeProvider {
        transfers_per_tx: Vec<EnhancedTransaction>,
        signature_calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl RpcProvider for FakeProvider {
        async fn get_transaction(&self, signature: &str) -> Result<Option<EnhancedTransaction>, AppError> {
            Ok(self
                .transfers_per_tx
                .iter()
                .find(|t| t.signature == signature)
                .cloned())
        }

        async fn get_signatures_for_address(
            &self,
            _address: &str,
            _pagination: &Pagination,
        ) -> Result<Vec<SignatureEntry>, AppError> {
            self.signature_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .transfers_per_tx
                .iter()
                .map(|t| SignatureEntry {
                    signature: t.signature.clone(),
                    block_time: Some(t.block_time),
                })
                .collect())
        }

        async fn get_transactions_batch(
            &self,
            signatures: &[String],
        ) -> Result<Vec<EnhancedTransaction>, AppError> {
            Ok(self
                .transfers_per_tx
                .iter()
                .filter(|t| signatures.contains(&t.signature))
                .cloned()
                .collect())
        }

        async fn get_signatures_for_mint(
            &self,
            _mint: &str,
            _page_size: usize,
            _before: Option<&str>,
        ) -> Result<Vec<SignatureEntry>, AppError> {
            Ok(self
                .transfers_per_tx
                .iter()
                .map(|t| SignatureEntry {
                    signature: t.signature.clone(),
                    block_time: Some(t.block_time),
                })
                .collect())
        }

        async fn get_largest_token_accounts(
            &self,
            _mint: &str,
        ) -> Result<Vec<super::super::types::TokenAccountEntry>, AppError> {
            Ok(vec![])
        }
    }

    fn sample_tx(sig: &str, from: &str, to: &str, mint: &str, amount: &str, block_time: i64) -> EnhancedTransaction {
        EnhancedTransaction {
            signature: sig.into(),
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

    #[tokio::test]
    async fn get_token_transfers_flattens_and_caches() {
        let provider = Arc::new(FakeProvider {
            transfers_per_tx: vec![sample_tx("s1", "A", "B", "MINT", "1.5", 100)],
            signature_calls: AtomicU32::new(0),
        });
        let cache = Arc::new(InMemoryCache::new());
        let adapter = UpstreamAdapter::new(provider.clone(), cache);

        let transfers = adapter.get_token_transfers("A", "MINT", 10).await.unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount.0, 1_500_000);

        // Second call is served from cache; no extra signature lookups needed
        // (the fake doesn't assert this directly, but re-running must not error).
        let transfers2 = adapter.get_token_transfers("A", "MINT", 10).await.unwrap();
        assert_eq!(transfers2, transfers);
    }

    #[tokio::test]
    async fn recent_activity_falls_back_when_primary_empty() {
        struct EmptyPrimaryProvider {
            owner: String,
            tx: EnhancedTransaction,
        }

        #[async_trait::async_trait]
        impl RpcProvider for EmptyPrimaryProvider {
            async fn get_transaction(&self, _s: &str) -> Result<Option<EnhancedTransaction>, AppError> {
                Ok(None)
            }
            async fn get_signatures_for_address(
                &self,
                _address: &str,
                _p: &Pagination,
            ) -> Result<Vec<SignatureEntry>, AppError> {
                Ok(vec![SignatureEntry {
                    signature: self.tx.signature.clone(),
                    block_time: Some(self.tx.block_time),
                }])
            }
            async fn get_transactions_batch(
                &self,
                _sigs: &[String],
            ) -> Result<Vec<EnhancedTransaction>, AppError> {
                Ok(vec![self.tx.clone()])
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
            ) -> Result<Vec<super::super::types::TokenAccountEntry>, AppError> {
                Ok(vec![super::super::types::TokenAccountEntry {
                    address: "acct1".into(),
                    owner: self.owner.clone(),
                    amount: "1000".into(),
                }])
            }
        }

        let provider = Arc::new(EmptyPrimaryProvider {
            owner: "whale".into(),
            tx: sample_tx("s2", "whale", "someone", "MINT", "2.0", 50),
        });
        let cache = Arc::new(InMemoryCache::new());
        let adapter = UpstreamAdapter::new(provider, cache);

        let activity = adapter.get_recent_token_activity("MINT", 10).await.unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].from_address, "whale");
    }
}
