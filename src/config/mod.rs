//! # Configuration
//!
//! Layered configuration loading and the root [`Config`] aggregate.
//!
//! Configuration is assembled once at startup from three layers, in
//! increasing precedence:
//!
//! 1. Embedded default TOML (`config/default.toml`, compiled into the binary)
//! 2. An optional user file under the XDG config directory
//! 3. Environment variables prefixed `CLAUDE_RAG_`, `__`-separated for nesting
//!
//! The result is validated with [`validator::Validate`] and then immutable:
//! a reload means building a new [`Config`] and swapping dependent services,
//! never mutating one in place.

mod loader;
mod types;

pub use loader::{get_default_config_toml, load_embedded_defaults_only, ConfigLoader};
pub use types::{
    CacheConfig, CacheNamespaceConfig, Config, DataConfig, EmbeddingConfig, IndexerConfig,
    ParserConfig, PoolConfig, QueryConfig, ServiceConfig, VectorStoreConfig,
};

/// Derive the vector-store collection name for a project, optionally scoped
/// to a specific worker so that concurrent test processes never collide on
/// the same collection even without external coordination (see the
/// concurrency model's worker-id derivation rule).
///
/// When `worker_id` is `Some`, the result is `"{prefix}_{worker_id}"`.
/// When `None`, a random UUID is used instead so repeated calls from the
/// same process still produce distinct names.
pub fn worker_collection_name(prefix: &str, worker_id: Option<&str>) -> String {
    match worker_id {
        Some(id) => format!("{prefix}_{id}"),
        None => format!("{prefix}_{}", uuid::Uuid::new_v4()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_collection_names_are_pairwise_distinct() {
        let names: Vec<String> = (0..8)
            .map(|i| worker_collection_name("claude_rag", Some(&i.to_string())))
            .collect();
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn unspecified_worker_id_still_yields_distinct_names() {
        let a = worker_collection_name("claude_rag", None);
        let b = worker_collection_name("claude_rag", None);
        assert_ne!(a, b);
    }
}
