use anyhow::{Context, Result};
use async_trait::async_trait;
use common::logging::init_tracing;
use common::{Candidate, CollaboratorError};
use serde_json::Value;
use signal_fusion::{
    load_config, ArtifactCache, CacheStore, CompletionClient, EngineConfig, GenerativeReviewer, GenerativeSynthesizer,
    HttpCompletionClient, InMemoryCache, RedisCache, TradeCardEngine,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Stand-in collaborator when no endpoint is configured; every card degrades
struct OfflineClient;

#[async_trait]
impl CompletionClient for OfflineClient {
    async fn complete(&self, _prompt: &str, _schema: &Value) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::Unavailable("no SYNTHESIS_URL configured".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    info!("Starting trade card cycle");

    let config = match std::env::var("ENGINE_CONFIG") {
        Ok(path) => load_config(&path).with_context(|| format!("loading engine config from {}", path))?,
        Err(_) => EngineConfig::default(),
    };

    let candidates_path = std::env::var("CANDIDATES_FILE").context("CANDIDATES_FILE must be set")?;
    let raw = std::fs::read_to_string(&candidates_path)
        .with_context(|| format!("reading candidates from {}", candidates_path))?;
    let candidates: Vec<Candidate> = serde_json::from_str(&raw).context("parsing candidates")?;

    let api_key = std::env::var("SYNTHESIS_API_KEY").ok();
    let (synthesis_client, review_client): (Arc<dyn CompletionClient>, Arc<dyn CompletionClient>) =
        match std::env::var("SYNTHESIS_URL") {
            Ok(url) => (
                Arc::new(HttpCompletionClient::new(&url, &config.synthesis.model, api_key.clone())),
                Arc::new(HttpCompletionClient::new(&url, &config.validation.review_model, api_key)),
            ),
            Err(_) => {
                warn!("SYNTHESIS_URL not set, running in degraded mode");
                (Arc::new(OfflineClient), Arc::new(OfflineClient))
            }
        };

    let store: Arc<dyn CacheStore> = match std::env::var("REDIS_URL") {
        Ok(url) => match RedisCache::connect(&url).await {
            Ok(redis) => Arc::new(redis),
            Err(e) => {
                warn!("Redis unavailable ({}), using in-process cache", e);
                Arc::new(InMemoryCache::new(config.cache.capacity))
            }
        },
        Err(_) => Arc::new(InMemoryCache::new(config.cache.capacity)),
    };
    let cache = ArtifactCache::new(store, config.cache.clone());

    let synthesizer = Arc::new(GenerativeSynthesizer::new(synthesis_client, config.synthesis.clone()));
    let reviewer = Arc::new(GenerativeReviewer::new(
        review_client,
        config.validation.review_timeout_ms,
        config.validation.max_review_issues,
    ));
    let engine = TradeCardEngine::new(&config, synthesizer, reviewer, cache).context("invalid engine config")?;

    let cycle_id = std::env::var("CYCLE_ID").unwrap_or_else(|_| chrono::Utc::now().format("%Y%m%d%H%M").to_string());
    let report = engine.evaluate(&cycle_id, candidates).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
