//! The upstream RPC / enhanced-transactions provider, abstracted as a trait
//! so a real HTTP client and a deterministic test double both satisfy it
//! (spec §9, "small interfaces so tests can substitute deterministic
//! fakes"). This is the primitive collaborator `UpstreamAdapter` (§4.1)
//! wraps with caching, retry, and circuit breaking.

use async_trait::async_trait;

use crate::error::AppError;
use crate::model::EnhancedTransaction;

use super::types::{Pagination, SignatureEntry, TokenAccountEntry};

#[async_trait]
pub trait RpcProvider: Send + Sync {
    async fn get_transaction(&self, signature: &str) -> Result<Option<EnhancedTransaction>, AppError>;

    async fn get_signatures_for_address(
        &self,
        address: &str,
        pagination: &Pagination,
    ) -> Result<Vec<SignatureEntry>, AppError>;

    /// Batch-resolve signatures to enhanced transactions. Batch size is the
    /// caller's concern (spec §4.1: "batch size 10").
    async fn get_transactions_batch(
        &self,
        signatures: &[String],
    ) -> Result<Vec<EnhancedTransaction>, AppError>;

    async fn get_signatures_for_mint(
        &self,
        mint: &str,
        page_size: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureEntry>, AppError>;

    async fn get_largest_token_accounts(
        &self,
        mint: &str,
    ) -> Result<Vec<TokenAccountEntry>, AppError>;
}

/// Real HTTP implementation against a Helius-shaped enhanced-RPC endpoint.
pub struct HttpRpcProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRpcProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client builds");
        HttpRpcProvider {
            client,
            base_url,
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}?api-key={}", self.base_url, path, self.api_key)
    }
}

#[async_trait]
impl RpcProvider for HttpRpcProvider {
    async fn get_transaction(&self, signature: &str) -> Result<Option<EnhancedTransaction>, AppError> {
        let url = self.url(&format!("/v0/transactions/{signature}"));
        let resp = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(map_reqwest_err)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::UpstreamRateLimited("transaction fetch".into()));
        }
        if !resp.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "upstream status {}",
                resp.status()
            )));
        }
        let tx: EnhancedTransaction = resp
            .json()
            .await
            .map_err(|e| AppError::UpstreamBadResponse(e.to_string()))?;
        Ok(Some(tx))
    }

    async fn get_signatures_for_address(
        &self,
        address: &str,
        pagination: &Pagination,
    ) -> Result<Vec<SignatureEntry>, AppError> {
        let mut url = self.url(&format!("/v0/addresses/{address}/transactions"));
        url.push_str(&format!("&limit={}", pagination.limit));
        if let Some(before) = &pagination.before {
            url.push_str(&format!("&before={before}"));
        }
        if let Some(until) = &pagination.until {
            url.push_str(&format!("&until={until}"));
        }
        let resp = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(map_reqwest_err)?;
        parse_json_vec(resp).await
    }

    async fn get_transactions_batch(
        &self,
        signatures: &[String],
    ) -> Result<Vec<EnhancedTransaction>, AppError> {
        let url = self.url("/v0/transactions");
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "transactions": signatures }))
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(map_reqwest_err)?;
        parse_json_vec(resp).await
    }

    async fn get_signatures_for_mint(
        &self,
        mint: &str,
        page_size: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureEntry>, AppError> {
        let page_size = page_size.min(1000);
        let mut url = self.url(&format!("/v0/token/{mint}/signatures"));
        url.push_str(&format!("&limit={page_size}"));
        if let Some(before) = before {
            url.push_str(&format!("&before={before}"));
        }
        let resp = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(map_reqwest_err)?;
        parse_json_vec(resp).await
    }

    async fn get_largest_token_accounts(
        &self,
        mint: &str,
    ) -> Result<Vec<TokenAccountEntry>, AppError> {
        let url = self.url(&format!("/v0/token/{mint}/largest-accounts"));
        let resp = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(map_reqwest_err)?;
        parse_json_vec(resp).await
    }
}

async fn parse_json_vec<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<Vec<T>, AppError> {
    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::UpstreamRateLimited("rate limited".into()));
    }
    if !resp.status().is_success() {
        return Err(AppError::UpstreamUnavailable(format!(
            "upstream status {}",
            resp.status()
        )));
    }
    resp.json()
        .await
        .map_err(|e| AppError::UpstreamBadResponse(e.to_string()))
}

fn map_reqwest_err(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::UpstreamUnavailable(format!("timed out: {e}"))
    } else {
        AppError::UpstreamUnavailable(e.to_string())
    }
}
