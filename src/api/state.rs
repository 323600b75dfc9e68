//! Shared application state. Every component here already does its own
//! internal synchronization (DashMap, an internal `Mutex`, or plain
//! immutability), so `AppState` is a flat bag of `Arc`s rather than the
//! single `RwLock<Inner>` the teacher used for its mutable session map.

use std::sync::Arc;

use crate::cache::Cache;
use crate::entities::EntityRegistry;
use crate::flowgraph::FlowGraphEngine;
use crate::intent::IntentClient;
use crate::persistence::Db;
use crate::risk::RiskEngine;
use crate::tenant::TenantGate;
use crate::upstream::UpstreamAdapter;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub upstream: Arc<UpstreamAdapter>,
    pub entities: Arc<EntityRegistry>,
    pub flowgraph: Arc<FlowGraphEngine>,
    pub risk: Arc<RiskEngine>,
    pub intent: Arc<IntentClient>,
    pub tenant: Arc<TenantGate>,
    pub cache: Arc<dyn Cache>,
    pub production: bool,
    pub allowed_origins: Vec<String>,
    /// Needed by handlers that mint keys directly (registration, key
    /// creation) outside the `TenantGate`'s own authentication path.
    pub api_key_salt: Arc<String>,
    /// Needed by the webhook handler to verify `x-webhook-signature`.
    pub webhook_secret: Arc<String>,
}
