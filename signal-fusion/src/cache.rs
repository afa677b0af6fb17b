// Cache Layer
// Cache-aside memoization for composite scores, trade cards and verdicts

use crate::config::CacheConfig;
use async_trait::async_trait;
use common::{CacheError, CompositeScore, Recommendation, Strictness, Uuid, ValidationVerdict};
use lru::LruCache;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Key/value store the cache layer writes through
///
/// Best effort: no transactions, no ordering across keys.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError>;
}

/// One stored payload
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
    pub ttl: Duration,
    pub created_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// In-process LRU store with per-entry TTL
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(1_024)
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => true,
            Some(entry) => return Ok(Some(entry.payload.clone())),
            None => return Ok(None),
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload: value,
            ttl: Duration::from_secs(ttl_secs),
            created_at: Instant::now(),
        };
        self.entries.lock().await.put(entry.key.clone(), entry);
        Ok(())
    }
}

/// Redis-backed store (`GET` / `SET key value EX ttl`)
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs.max(1))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}

/// Typed cache-aside access for the engine's artifacts
///
/// Store failures and undecodable payloads are logged and read as misses.
#[derive(Clone)]
pub struct ArtifactCache {
    store: Option<Arc<dyn CacheStore>>,
    config: CacheConfig,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        let store = config.enabled.then_some(store);
        Self { store, config }
    }

    /// A cache that never hits and never writes
    pub fn disabled() -> Self {
        Self {
            store: None,
            config: CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn composite_key(symbol: &str, hour_bucket: &str) -> String {
        format!("composite:{}:{}", symbol, hour_bucket)
    }

    pub fn recommendation_key(symbol: &str, cycle_id: &str) -> String {
        format!("recommendation:{}:{}", symbol, cycle_id)
    }

    pub fn verdict_key(recommendation_id: Uuid, strictness: Strictness) -> String {
        format!("verdict:{}:{}", recommendation_id, strictness)
    }

    pub async fn composite(&self, symbol: &str, hour_bucket: &str) -> Option<CompositeScore> {
        self.fetch(&Self::composite_key(symbol, hour_bucket)).await
    }

    pub async fn put_composite(&self, symbol: &str, hour_bucket: &str, score: &CompositeScore) {
        let key = Self::composite_key(symbol, hour_bucket);
        self.store_value(&key, score, self.config.composite_ttl_secs).await;
    }

    pub async fn recommendation(&self, symbol: &str, cycle_id: &str) -> Option<Recommendation> {
        self.fetch(&Self::recommendation_key(symbol, cycle_id)).await
    }

    pub async fn put_recommendation(&self, cycle_id: &str, recommendation: &Recommendation) {
        let key = Self::recommendation_key(&recommendation.symbol, cycle_id);
        self.store_value(&key, recommendation, self.config.recommendation_ttl_secs).await;
    }

    pub async fn verdict(&self, recommendation_id: Uuid, strictness: Strictness) -> Option<ValidationVerdict> {
        self.fetch(&Self::verdict_key(recommendation_id, strictness)).await
    }

    pub async fn put_verdict(&self, recommendation_id: Uuid, verdict: &ValidationVerdict) {
        let key = Self::verdict_key(recommendation_id, verdict.strictness);
        self.store_value(&key, verdict, self.config.verdict_ttl_secs).await;
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, "Discarding undecodable cache payload: {}", CacheError::from(e));
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, "Cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn store_value<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, "Could not encode cache payload: {}", e);
                return;
            }
        };
        if let Err(e) = store.set(key, payload, ttl_secs).await {
            warn!(key = %key, "Cache write failed, ignoring: {}", e);
        }
    }
}
