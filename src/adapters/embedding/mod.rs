//! Embedding engine (C5): a `fastembed` local ONNX provider, a
//! deterministic mock for tests, and the cache-aware batching algorithm
//! that sits in front of either. Grounded on the `fastembed-rs` sibling
//! repo's provider shape.

#[cfg(feature = "fastembed")]
mod local;
mod mock;
mod worker;

#[cfg(feature = "fastembed")]
pub use local::FastEmbedProvider;
pub use mock::MockEmbeddingProvider;

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::domain::error::Result;
use crate::domain::ports::cache::SharedCacheProvider;
use crate::domain::ports::embedding::SharedEmbeddingProvider;

const CACHE_NAMESPACE: &str = "embeddings";

/// Cache key for a piece of text under a given model: `sha256(utf8(text))`
/// joined with the model name, per the data model's `CacheEntry` contract.
pub fn cache_key(text: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    format!("{}:{model}", hex::encode(digest))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Orchestrates cache lookups, in-process or process-parallel generation,
/// and cache backfill around a raw [`crate::domain::ports::embedding::EmbeddingProvider`].
///
/// This is the `batch_generate` algorithm from the embedding engine
/// contract: check cache, generate misses (inline or fanned out across
/// worker processes depending on batch size), backfill the cache, and
/// reassemble results in the caller's original order.
pub struct CachedEmbeddingEngine {
    provider: SharedEmbeddingProvider,
    cache: SharedCacheProvider,
    model_name: String,
    cache_ttl: Duration,
    parallel_batch_threshold: usize,
    parallel_workers: usize,
    enable_parallel: bool,
}

impl CachedEmbeddingEngine {
    /// Builds an engine over `provider`, backed by `cache`.
    pub fn new(
        provider: SharedEmbeddingProvider,
        cache: SharedCacheProvider,
        model_name: String,
        cache_ttl: Duration,
        parallel_batch_threshold: usize,
        parallel_workers: usize,
        enable_parallel: bool,
    ) -> Self {
        Self {
            provider,
            cache,
            model_name,
            cache_ttl,
            parallel_batch_threshold,
            parallel_workers,
            enable_parallel,
        }
    }

    /// Embeds a single text, going through the cache.
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.batch_generate(std::slice::from_ref(&text.to_string()), false).await?;
        Ok(result.remove(0))
    }

    /// Embeds a batch of texts, preserving order. See the module doc for
    /// the cache/parallel-fanout algorithm.
    pub async fn batch_generate(&self, texts: &[String], show_progress: bool) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = texts.iter().map(|t| cache_key(t, &self.model_name)).collect();
        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut miss_indices = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match self.cache.get(CACHE_NAMESPACE, key).await? {
                Some(bytes) => slots.push(Some(decode_vector(&bytes))),
                None => {
                    slots.push(None);
                    miss_indices.push(i);
                }
            }
        }

        if !miss_indices.is_empty() {
            let miss_texts: Vec<String> = miss_indices.iter().map(|&i| texts[i].clone()).collect();
            let generated = self.generate_misses(&miss_texts).await?;

            for (offset, &idx) in miss_indices.iter().enumerate() {
                let vector = generated[offset].clone();
                self.cache
                    .put(
                        CACHE_NAMESPACE,
                        &keys[idx],
                        encode_vector(&vector),
                        self.cache_ttl,
                    )
                    .await?;
                slots[idx] = Some(vector);
            }
        }

        if show_progress {
            let hit_ratio = 1.0 - (miss_indices.len() as f64 / texts.len() as f64);
            info!(hit_ratio, total = texts.len(), "embedding batch cache hit ratio");
        }

        Ok(slots.into_iter().map(|v| v.expect("every slot filled")).collect())
    }

    async fn generate_misses(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.enable_parallel || texts.len() < self.parallel_batch_threshold {
            debug!(count = texts.len(), "embedding misses inline");
            return self.provider.embed_batch(texts).await;
        }

        debug!(
            count = texts.len(),
            workers = self.parallel_workers,
            "embedding misses across worker processes"
        );
        match worker::embed_via_workers(texts, self.parallel_workers).await {
            Ok(vectors) => Ok(vectors),
            Err(e) => {
                tracing::warn!(error = %e, "worker-process embedding failed, retrying inline once");
                self.provider.embed_batch(texts).await
            }
        }
    }
}

/// Convenience constructor producing a [`SharedEmbeddingProvider`]-free
/// wrapper for call sites that only need the cache-key helper.
pub fn shared_mock() -> SharedEmbeddingProvider {
    Arc::new(MockEmbeddingProvider::new(768))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::TieredCacheProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingProvider {
        inner: MockEmbeddingProvider,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl crate::domain::ports::embedding::EmbeddingProvider for CountingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
        fn provider_name(&self) -> &str {
            "counting-mock"
        }
    }

    fn engine(dir: &tempfile::TempDir) -> CachedEmbeddingEngine {
        let cache = TieredCacheProvider::open(&dir.path().join("cache.db"), 1000).unwrap();
        CachedEmbeddingEngine::new(
            Arc::new(CountingProvider {
                inner: MockEmbeddingProvider::new(8),
                calls: AtomicUsize::new(0),
            }),
            Arc::new(cache),
            "mock-model".to_string(),
            Duration::from_secs(3600),
            10,
            2,
            true,
        )
    }

    #[tokio::test]
    async fn repeated_text_hits_cache_on_second_call() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let first = engine.batch_generate(&["hello".to_string()], false).await.unwrap();
        let second = engine.batch_generate(&["hello".to_string()], false).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn batch_generate_preserves_input_order() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vectors = engine.batch_generate(&texts, false).await.unwrap();
        assert_eq!(vectors.len(), 3);
        // Deterministic mock: same text always yields the same vector.
        let a_again = engine.batch_generate(&["a".to_string()], false).await.unwrap();
        assert_eq!(vectors[0], a_again[0]);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_without_touching_cache() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let vectors = engine.batch_generate(&[], false).await.unwrap();
        assert!(vectors.is_empty());
    }
}
