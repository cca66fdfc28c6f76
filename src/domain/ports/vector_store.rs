//! Vector storage backend interface.
//!
//! Mirrors the wire contract of a point-oriented vector database: collections
//! keyed by name, points carrying a vector plus a JSON payload, similarity
//! search with an optional payload filter, and point deletion by id or
//! filter. A project's data lives in exactly one collection, named by
//! [`crate::config::worker_collection_name`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::Result;

/// A single stored vector plus its JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    /// Point identifier, unique within its collection
    pub id: String,
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Arbitrary JSON payload (chunk content, file path, metadata, ...)
    pub payload: Value,
}

/// A match returned from a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    /// Matched point id
    pub id: String,
    /// Similarity score (cosine, higher is better). `0.0` on `scroll`
    /// results, which are not ranked by similarity.
    pub score: f32,
    /// The stored payload
    pub payload: Value,
    /// The point's vector, when the call requested it. `scroll` always
    /// populates this so payload-rewrite callers (rename/reclassify/merge)
    /// can re-upsert without silently zeroing the vector; `search` leaves
    /// it `None` since callers only need the score and payload there.
    pub vector: Option<Vec<f32>>,
}

/// A filter over payload fields, used to scope a search or delete to a
/// subset of a collection (e.g. a single file's chunks).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadFilter {
    /// Exact-match conditions: payload field name -> required value
    pub must_match: Vec<(String, Value)>,
}

impl PayloadFilter {
    /// Build a filter matching a single payload field to a value.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            must_match: vec![(field.into(), value.into())],
        }
    }

    /// Add another required field match, consuming and returning `self`.
    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must_match.push((field.into(), value.into()));
        self
    }

    /// Whether this filter has no conditions (matches everything).
    pub fn is_empty(&self) -> bool {
        self.must_match.is_empty()
    }
}

/// Vector storage backend contract.
///
/// Implementations: a Qdrant-backed production adapter and an in-memory
/// adapter used by tests and offline fixtures.
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Ensure a collection exists with the given vector dimensionality,
    /// creating it with cosine distance if absent. Idempotent.
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()>;

    /// Insert or overwrite points by id.
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()>;

    /// Return the `limit` nearest points to `query`, optionally restricted
    /// by `filter`.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<PayloadFilter>,
    ) -> Result<Vec<VectorMatch>>;

    /// Cursor-stable pagination over a collection's points, ordered by id
    /// regardless of concurrent mutation. `cursor` is the opaque value
    /// returned as the second element of the previous call's result; `None`
    /// starts from the beginning. The returned cursor is `None` once the
    /// scroll is exhausted.
    async fn scroll(
        &self,
        collection: &str,
        filter: Option<PayloadFilter>,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<(Vec<VectorMatch>, Option<String>)>;

    /// Delete points by id.
    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// Delete every point matching `filter`.
    async fn delete_by_filter(&self, collection: &str, filter: PayloadFilter) -> Result<u64>;

    /// Count points in a collection, optionally restricted by `filter`.
    async fn count(&self, collection: &str, filter: Option<PayloadFilter>) -> Result<u64>;

    /// Drop an entire collection (used by project deletion).
    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Health check for the provider (default: a lightweight count on a
    /// well-known collection name; backends may override with a cheaper
    /// connectivity probe).
    async fn health_check(&self) -> Result<()> {
        self.count("__health__", None).await.map(|_| ())
    }
}

/// Shared, cloneable handle to a vector store provider.
pub type SharedVectorStoreProvider = Arc<dyn VectorStoreProvider>;
