//! Deterministic embedding provider used by tests: same text always yields
//! the same vector, with no model download or inference cost.

use async_trait::async_trait;
use seahash::SeaHasher;
use std::hash::{Hash, Hasher};

use crate::domain::error::Result;
use crate::domain::ports::embedding::EmbeddingProvider;

/// Hashes text into a fixed-dimension unit vector. Not semantically
/// meaningful; exists so tests can exercise caching, batching, and search
/// plumbing without a real model.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    /// Creates a mock provider producing vectors of `dimensions` length.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

fn hash_to_vector(text: &str, dimensions: usize) -> Vec<f32> {
    (0..dimensions)
        .map(|i| {
            let mut hasher = SeaHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            ((h % 2000) as f32 / 1000.0) - 1.0
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_to_vector(text, self.dimensions))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_to_vector(t, self.dimensions)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_yields_identical_vector() {
        let provider = MockEmbeddingProvider::new(16);
        let a = provider.embed("same text").await.unwrap();
        let b = provider.embed("same text").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_yields_different_vector() {
        let provider = MockEmbeddingProvider::new(16);
        let a = provider.embed("one").await.unwrap();
        let b = provider.embed("two").await.unwrap();
        assert_ne!(a, b);
    }
}
