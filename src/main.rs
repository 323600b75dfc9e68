mod api;
mod cache;
mod classifier;
mod config;
mod entities;
mod error;
mod flowgraph;
mod intent;
mod model;
mod persistence;
mod risk;
mod tenant;
mod upstream;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use api::state::AppState;
use cache::{Cache, InMemoryCache, NoopCache};
use config::Config;
use entities::EntityRegistry;
use flowgraph::FlowGraphEngine;
use intent::{HttpIntentClassifier, IntentClassifier, IntentClient};
use risk::RiskEngine;
use tenant::{apikey, TenantGate};
use upstream::{HttpRpcProvider, RpcProvider, UpstreamAdapter};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env().context("loading configuration")?;
    apikey::validate_salt(&config.api_key_salt).context("validating API_KEY_SALT")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let db = persistence::open(Path::new(&config.db_path))
        .with_context(|| format!("opening database at {}", config.db_path))?;

    let entities = Arc::new(EntityRegistry::load(db.clone()).await.context("loading entity registry")?);

    let cache: Arc<dyn Cache> = match &config.kv_host {
        Some(_) => Arc::new(InMemoryCache::new()),
        None => Arc::new(NoopCache),
    };

    let provider: Arc<dyn RpcProvider> =
        Arc::new(HttpRpcProvider::new(config.upstream_base_url.clone(), config.upstream_api_key.clone()));
    let upstream = Arc::new(UpstreamAdapter::new(provider, cache.clone()));

    let flowgraph = Arc::new(FlowGraphEngine::new(upstream.clone(), entities.clone(), db.clone()));
    let risk = Arc::new(RiskEngine::new(upstream.clone(), entities.clone(), flowgraph.clone(), cache.clone(), db.clone()));

    let classifier: Arc<dyn IntentClassifier> = Arc::new(HttpIntentClassifier::new(
        config.intent_service_url.clone().unwrap_or_else(|| "http://localhost:9100/classify".into()),
    ));
    let intent = Arc::new(IntentClient::new(classifier, cache.clone()));

    let tenant = Arc::new(TenantGate::new(db.clone(), config.api_key_salt.clone(), cache.clone()));

    let state = AppState {
        db,
        upstream,
        entities,
        flowgraph,
        risk,
        intent,
        tenant,
        cache,
        production: config.production,
        allowed_origins: config.allowed_origins.clone(),
        api_key_salt: Arc::new(config.api_key_salt.clone()),
        webhook_secret: Arc::new(config.webhook_secret.clone()),
    };

    let app = api::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(%addr, "token-flow-api listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    axum::serve(listener, app).await.context("running server")?;

    Ok(())
}
