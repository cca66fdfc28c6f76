//! Concrete implementations of the `domain::ports` traits: the embedding
//! engine (C5), the cache (C4), and the vector store (C3).

pub mod cache;
pub mod embedding;
pub mod vector_store;
