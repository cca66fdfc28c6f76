//! Domain Port Interfaces
//!
//! Defines all boundary contracts between domain and external layers.
//! Ports are trait-based abstractions that enable dependency injection
//! and allow implementations to be swapped at runtime.
//!
//! ## Organization
//!
//! - **embedding.rs** - Text embedding providers
//! - **vector_store.rs** - Vector storage backends
//! - **cache.rs** - Durable key-value caches (embedding cache)
//! - **query_expander.rs** - Pluggable query expansion strategies

/// AI embedding provider interfaces for semantic text understanding
pub mod embedding;
/// Durable, namespaced cache interfaces
pub mod cache;
/// Pluggable query expansion strategies
pub mod query_expander;
/// Vector storage backend interfaces for multi-project semantic search
pub mod vector_store;

pub use cache::{CacheProvider, SharedCacheProvider};
pub use embedding::{EmbeddingProvider, SharedEmbeddingProvider};
pub use query_expander::{QueryExpander, SharedQueryExpander};
pub use vector_store::{
    PayloadFilter, SharedVectorStoreProvider, VectorMatch, VectorPoint, VectorStoreProvider,
};
