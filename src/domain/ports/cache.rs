//! Durable, namespaced cache interface used by the embedding cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::error::Result;

/// Aggregate hit/miss counters for a cache namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of lookups that found a live entry
    pub hits: u64,
    /// Number of lookups that found nothing or an expired entry
    pub misses: u64,
    /// Number of entries currently stored
    pub entries: u64,
}

impl CacheStats {
    /// Hit ratio in `[0.0, 1.0]`; `0.0` when there have been no lookups yet.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A durable, TTL-expiring byte cache, namespaced so unrelated consumers
/// (embedding cache, query result cache) don't collide on keys.
///
/// Implementations own both a hot in-process tier and a durable tier; the
/// trait only exposes the logical get/put/invalidate surface, not the
/// tiering strategy.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Fetch a value by key within `namespace`. Returns `None` on miss or
    /// expiry.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value, expiring after `ttl`.
    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove a single entry, if present.
    async fn invalidate(&self, namespace: &str, key: &str) -> Result<()>;

    /// Remove every entry in `namespace`.
    async fn clear_namespace(&self, namespace: &str) -> Result<()>;

    /// Current stats for `namespace`.
    async fn stats(&self, namespace: &str) -> Result<CacheStats>;

    /// Backend identifier for logging (`"moka+sqlite"`, `"null"`, ...).
    fn backend_type(&self) -> &str;
}

/// Shared, cloneable handle to a cache provider.
pub type SharedCacheProvider = Arc<dyn CacheProvider>;
