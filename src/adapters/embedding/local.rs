//! `fastembed`-backed [`EmbeddingProvider`]: local ONNX inference, no
//! network calls once the model is cached on disk.
//!
//! Grounded on the `fastembed-rs` sibling repo's lazily-initialized,
//! mutex-guarded `TextEmbedding` pattern; mapped here onto the closed
//! model set in [`crate::domain::types::EmbeddingModel`] instead of Nomic.

use std::sync::Mutex;

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use crate::domain::error::{Error, Result};
use crate::domain::ports::embedding::EmbeddingProvider;
use crate::domain::types::EmbeddingModel;

fn to_fastembed_model(model: EmbeddingModel) -> FastEmbedModel {
    match model {
        EmbeddingModel::AllMiniLmL6V2 => FastEmbedModel::AllMiniLML6V2,
        EmbeddingModel::AllMiniLmL12V2 => FastEmbedModel::AllMiniLML12V2,
        EmbeddingModel::AllMpnetBaseV2 => FastEmbedModel::AllMpnetBaseV2,
    }
}

/// Loads the ONNX model lazily on first use and serializes calls through a
/// mutex, since `TextEmbedding::embed` takes `&mut self`.
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
    dimensions: usize,
    name: &'static str,
}

impl FastEmbedProvider {
    /// Initializes the model for `model`, downloading weights into
    /// `cache_dir` if they are not already present there.
    pub fn new(model: EmbeddingModel, cache_dir: std::path::PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        let options = InitOptions::new(to_fastembed_model(model))
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        let embedding = TextEmbedding::try_new(options).map_err(|e| Error::Embedding {
            message: format!("failed to initialize fastembed model {model}: {e}"),
        })?;
        Ok(Self {
            model: Mutex::new(embedding),
            dimensions: model.dimensions(),
            name: model.as_str(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding_failed(text.chars().take(64).collect::<String>(), "no vector produced"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let owned = texts.to_vec();
        // fastembed's inference is CPU-bound and synchronous; run it on the
        // blocking pool so it doesn't stall the cooperative scheduler.
        let dimensions = self.dimensions;
        let embeddings = tokio::task::block_in_place(move || {
            let mut model = self
                .model
                .lock()
                .map_err(|e| Error::Embedding { message: format!("model lock poisoned: {e}") })?;
            let refs: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
            model.embed(refs, None).map_err(|e| Error::EmbeddingFailed {
                input: owned.first().cloned().unwrap_or_default().chars().take(64).collect(),
                message: e.to_string(),
            })
        })?;
        debug_assert!(embeddings.iter().all(|v| v.len() == dimensions));
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        self.name
    }
}
