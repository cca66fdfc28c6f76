//! Core indexing-and-retrieval engine for a multi-project semantic memory
//! service: incremental code and note indexing, cached embeddings, and
//! hybrid (dense + lexical) search over a tiered connection pool and
//! vector store.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod indexer;
pub mod memory;
pub mod parser;
pub mod pool;
pub mod query;

// Re-export core types for convenient downstream use.
pub use domain::error::{Error, Result};
pub use domain::types::*;
