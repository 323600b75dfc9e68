//! Intent Inference Client (spec §4.6): a thin, cached contract to an
//! external transaction-intent classifier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheExt};
use crate::error::AppError;
use crate::model::ParsedTransaction;

const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Transfer,
    Trading,
    Arbitrage,
    Bridging,
    YieldFarming,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentPrediction {
    pub intent: Intent,
    pub confidence: f64,
}

impl IntentPrediction {
    fn unknown() -> Self {
        IntentPrediction {
            intent: Intent::Unknown,
            confidence: 0.0,
        }
    }
}

/// The external classifier, abstracted so tests can substitute a fake.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, request: &ClassifierRequestOwned) -> Result<IntentPrediction, AppError>;
}

/// Owned counterpart of `ClassifierRequest`, since trait objects can't carry
/// the borrow across the `async_trait` boxing boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierRequestOwned {
    pub signature: String,
    pub instructions: Vec<crate::model::Instruction>,
    pub accounts: Vec<crate::model::AccountEntry>,
    pub fee: u64,
}

pub struct HttpIntentClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpIntentClassifier {
    pub fn new(endpoint: String) -> Self {
        HttpIntentClassifier {
            client: reqwest::Client::builder().build().expect("reqwest client builds"),
            endpoint,
        }
    }
}

#[async_trait]
impl IntentClassifier for HttpIntentClassifier {
    async fn classify(&self, request: &ClassifierRequestOwned) -> Result<IntentPrediction, AppError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "intent classifier status {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| AppError::UpstreamBadResponse(e.to_string()))
    }
}

pub struct IntentClient {
    classifier: Arc<dyn IntentClassifier>,
    cache: Arc<dyn Cache>,
}

impl IntentClient {
    pub fn new(classifier: Arc<dyn IntentClassifier>, cache: Arc<dyn Cache>) -> Self {
        IntentClient { classifier, cache }
    }

    /// `predictIntent(tx)` (spec §4.6). On upstream failure, returns
    /// `{unknown, 0}` and leaves the cache untouched.
    pub async fn predict_intent(&self, tx: &ParsedTransaction) -> IntentPrediction {
        let cache_key = format!("intent:{}", tx.signature);
        if let Some(cached) = self.cache.get_json::<IntentPrediction>(&cache_key).await {
            return cached;
        }

        let request = ClassifierRequestOwned {
            signature: tx.signature.clone(),
            instructions: tx.instructions.clone(),
            accounts: tx.accounts.clone(),
            fee: tx.fee,
        };

        match self.classifier.classify(&request).await {
            Ok(prediction) => {
                self.cache.set_json(&cache_key, &prediction, CACHE_TTL).await;
                prediction
            }
            Err(_) => IntentPrediction::unknown(),
        }
    }

    /// `predictBatch(txs)`: fan-out helper, one `predictIntent` call per
    /// transaction run concurrently.
    pub async fn predict_batch(&self, txs: &[ParsedTransaction]) -> Vec<IntentPrediction> {
        let futures = txs.iter().map(|tx| self.predict_intent(tx));
        futures::future::join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::model::AccountEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClassifier {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl IntentClassifier for FakeClassifier {
        async fn classify(&self, _request: &ClassifierRequestOwned) -> Result<IntentPrediction, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::UpstreamUnavailable("down".into()));
            }
            Ok(IntentPrediction {
                intent: Intent::Trading,
                confidence: 0.9,
            })
        }
    }

    fn sample_tx(signature: &str) -> ParsedTransaction {
        ParsedTransaction {
            signature: signature.into(),
            block_time: 0,
            slot: 1,
            fee: 5000,
            success: true,
            accounts: vec![AccountEntry {
                pubkey: "A".into(),
                signer: true,
                writable: true,
            }],
            instructions: vec![],
        }
    }

    #[tokio::test]
    async fn caches_successful_prediction() {
        let classifier = Arc::new(FakeClassifier {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let client = IntentClient::new(classifier.clone(), Arc::new(InMemoryCache::new()));

        let tx = sample_tx("sig1");
        let first = client.predict_intent(&tx).await;
        let second = client.predict_intent(&tx).await;

        assert_eq!(first.intent, Intent::Trading);
        assert_eq!(second.intent, Intent::Trading);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_to_unknown_without_caching() {
        let classifier = Arc::new(FakeClassifier {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let client = IntentClient::new(classifier.clone(), Arc::new(InMemoryCache::new()));

        let tx = sample_tx("sig2");
        let first = client.predict_intent(&tx).await;
        let second = client.predict_intent(&tx).await;

        assert_eq!(first.intent, Intent::Unknown);
        assert_eq!(first.confidence, 0.0);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }
}
