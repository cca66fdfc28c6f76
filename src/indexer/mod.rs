//! Incremental indexer (C7): file discovery, change detection, semantic
//! unit extraction, delete-before-reinsert, cache-aware embedding, and
//! bulk upsert into the vector store.
//!
//! [`discover`] and [`file_index`] hold the leaf pieces (walking, the
//! last-indexed-hash table); [`pipeline`] is the orchestrator that strings
//! them together with the parser (C6), the embedding engine (C5), and the
//! vector store adapter (C3) per spec.md §4.7's eight-step per-file
//! pipeline.

pub mod discover;
pub mod file_index;
pub mod pipeline;

pub use pipeline::{FileOutcome, IndexProgressReporter, IndexReport, IndexingService, NoopProgressReporter};
