use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::error::Result;

/// Converts text into dense embedding vectors.
///
/// Implementations: a `fastembed`-backed local ONNX provider (optionally
/// fanning out across worker processes for large batches) and a
/// deterministic mock used by tests.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of texts, preserving input order in the output.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of vectors this provider produces.
    fn dimensions(&self) -> usize;

    /// Provider name, as recorded on [`crate::domain::types::CacheEntry`] keys.
    fn provider_name(&self) -> &str;

    /// Health check (default: embed a short fixed string).
    async fn health_check(&self) -> Result<()> {
        self.embed("health check").await?;
        Ok(())
    }
}

/// Shared, cloneable handle to an embedding provider.
pub type SharedEmbeddingProvider = Arc<dyn EmbeddingProvider>;
