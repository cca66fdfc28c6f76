//! Configuration type definitions and validation rules.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::types::EmbeddingModel;

/// Root data directory and the file layout beneath it.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DataConfig {
    /// Base directory for all persisted state (default `$HOME/.claude-rag`)
    #[validate(length(min = 1))]
    pub base_data_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_data_dir: "~/.claude-rag".to_string(),
        }
    }
}

impl DataConfig {
    /// Resolve `base_data_dir`, expanding `~`, creating it if absent.
    pub fn resolve_data_dir(&self) -> crate::domain::error::Result<PathBuf> {
        let expanded = shellexpand::tilde(&self.base_data_dir).into_owned();
        let path = PathBuf::from(expanded);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Path to the durable embedding cache database.
    pub fn embedding_cache_path(&self) -> crate::domain::error::Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("embedding_cache.db"))
    }

    /// Path to the incremental indexer's file metadata database.
    pub fn metadata_db_path(&self) -> crate::domain::error::Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("metadata.db"))
    }

    /// Path to the memory service's durable store.
    pub fn memory_db_path(&self) -> crate::domain::error::Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("memory.db"))
    }

    /// Path to the time-series health metrics store (an external
    /// collaborator's domain per spec.md §6; the core only writes counters
    /// here, it does not read or aggregate them).
    pub fn monitoring_db_path(&self) -> crate::domain::error::Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("monitoring.db"))
    }

    /// Path to the optional feedback log.
    pub fn feedback_db_path(&self) -> crate::domain::error::Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("feedback.db"))
    }
}

/// Connection pool sizing and health-check tuning.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PoolConfig {
    /// Minimum number of warm connections kept ready
    #[validate(range(min = 0))]
    pub min_size: usize,
    /// Maximum number of connections the pool will open
    #[validate(range(min = 1))]
    pub max_size: usize,
    /// Milliseconds to wait for a permit before returning `ResourceExhausted`
    #[validate(range(min = 1))]
    pub acquire_timeout_ms: u64,
    /// Base backoff in milliseconds for exponential retry (`base * 2^attempt`)
    #[validate(range(min = 1))]
    pub backoff_base_ms: u64,
    /// Upper bound on a single backoff delay
    #[validate(range(min = 1))]
    pub backoff_max_ms: u64,
    /// CPU utilization percentage above which the pool reports unhealthy
    #[validate(range(min = 1, max = 100))]
    pub unhealthy_cpu_percent: f32,
    /// Memory utilization percentage above which the pool reports unhealthy
    #[validate(range(min = 1, max = 100))]
    pub unhealthy_memory_percent: f32,
    /// Maximum age of a pooled connection, in seconds, before it is
    /// recycled on release rather than returned to the pool as-is.
    #[validate(range(min = 1))]
    pub recycle_seconds: u64,
    /// Fast health-check budget, in milliseconds (standard tier).
    #[validate(range(min = 1))]
    pub health_check_fast_ms: u64,
    /// Medium health-check budget, in milliseconds (standard tier).
    #[validate(range(min = 1))]
    pub health_check_medium_ms: u64,
    /// Deep health-check budget, in milliseconds (standard tier).
    #[validate(range(min = 1))]
    pub health_check_deep_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 16,
            acquire_timeout_ms: 5_000,
            backoff_base_ms: 50,
            backoff_max_ms: 5_000,
            unhealthy_cpu_percent: 90.0,
            unhealthy_memory_percent: 90.0,
            recycle_seconds: 3_600,
            health_check_fast_ms: 50,
            health_check_medium_ms: 100,
            health_check_deep_ms: 200,
        }
    }
}

impl PoolConfig {
    /// The relaxed health-check tier used once the pool detects sustained
    /// high latency (§4.2): 10x the standard budgets, per spec's
    /// 0.5/1.0/2.0s relaxed figures relative to the 50/100/200ms standard
    /// ones.
    pub fn relaxed_health_check_ms(&self) -> (u64, u64, u64) {
        (
            self.health_check_fast_ms * 10,
            self.health_check_medium_ms * 10,
            self.health_check_deep_ms * 10,
        )
    }
}

/// Embedding provider configuration (C5).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EmbeddingConfig {
    /// Provider backend: `"fastembed"` (local ONNX) or `"mock"` (tests,
    /// deterministic hash-seeded vectors, no model download).
    #[validate(length(min = 1))]
    pub provider: String,
    /// Embedding model name; must be one of the closed set in §6
    pub model: String,
    /// Vector dimension; derived from `model`, overridable only for custom models
    #[validate(range(min = 1))]
    pub dimensions: usize,
    /// Whether multi-worker process-parallel embedding is enabled
    pub enable_parallel: bool,
    /// Worker process count when parallel embedding is enabled
    #[validate(range(min = 1))]
    pub parallel_workers: usize,
    /// Batches smaller than this are embedded in-process rather than
    /// dispatched to worker processes
    #[validate(range(min = 1))]
    pub parallel_batch_threshold: usize,
}

impl EmbeddingConfig {
    /// Parses and validates `model` against the closed set, returning its
    /// canonical [`EmbeddingModel`].
    pub fn resolved_model(&self) -> crate::domain::error::Result<EmbeddingModel> {
        EmbeddingModel::parse(&self.model)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let model = EmbeddingModel::default();
        Self {
            provider: "fastembed".to_string(),
            model: model.as_str().to_string(),
            dimensions: model.dimensions(),
            enable_parallel: true,
            parallel_workers: num_cpus(),
            parallel_batch_threshold: 10,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Vector store adapter configuration (C3).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VectorStoreConfig {
    /// Network address of the vector database
    #[validate(length(min = 1))]
    pub address: String,
    /// Prefix applied to all collection names (see worker-id derivation)
    #[validate(length(min = 1))]
    pub collection_prefix: String,
    /// Vector dimension the adapter expects collections to use
    #[validate(range(min = 1))]
    pub dimensions: usize,
    /// Request timeout in seconds
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:6334".to_string(),
            collection_prefix: "claude_rag".to_string(),
            dimensions: EmbeddingModel::default().dimensions(),
            timeout_secs: 30,
        }
    }
}

/// A single cache namespace's sizing and expiry policy.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheNamespaceConfig {
    /// Maximum number of hot (in-process) entries
    #[validate(range(min = 1))]
    pub max_entries: u64,
    /// Time-to-live for entries, in seconds
    #[validate(range(min = 1))]
    pub ttl_secs: u64,
}

impl Default for CacheNamespaceConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            ttl_secs: 30 * 24 * 60 * 60,
        }
    }
}

/// Embedding cache configuration (hot moka tier + durable sqlite tier).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// Embedding cache namespace settings
    #[validate(nested)]
    pub embeddings: CacheNamespaceConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embeddings: CacheNamespaceConfig::default(),
        }
    }
}

/// Source parsing limits.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ParserConfig {
    /// Files larger than this are chunked by line windows, not parsed
    #[validate(range(min = 1))]
    pub max_parse_bytes: u64,
    /// Minimum chunk length in characters; shorter chunks are dropped
    #[validate(range(min = 1))]
    pub min_chunk_chars: usize,
    /// Maximum chunks emitted per file
    #[validate(range(min = 1))]
    pub max_chunks_per_file: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_parse_bytes: 2 * 1024 * 1024,
            min_chunk_chars: 20,
            max_chunks_per_file: 500,
        }
    }
}

/// Incremental indexer tuning.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IndexerConfig {
    /// Number of files processed concurrently during a sweep
    #[validate(range(min = 1))]
    pub concurrency: usize,
    /// Bytes sniffed from the head of a file for binary detection
    #[validate(range(min = 1))]
    pub binary_sniff_bytes: usize,
    /// Built-in exclude patterns, applied in addition to `.ragignore`/`.gitignore`
    pub builtin_excludes: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            binary_sniff_bytes: 8 * 1024,
            builtin_excludes: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "target".to_string(),
                "dist".to_string(),
                "build".to_string(),
                ".venv".to_string(),
            ],
        }
    }
}

/// Query engine tuning (expansion, hybrid fusion, ranking).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QueryConfig {
    /// Whether the lexical (BM25) side of hybrid search runs at all; when
    /// `false`, `retrieve` in hybrid mode degrades to dense-only.
    pub hybrid_search_enabled: bool,
    /// Weight given to the dense (embedding) score in `[0.0, 1.0]`;
    /// `1.0 - alpha` goes to the lexical (BM25) score.
    #[validate(range(min = 0.0, max = 1.0))]
    pub alpha: f32,
    /// Number of dense candidates fetched before fusion and re-ranking
    #[validate(range(min = 1))]
    pub candidate_pool_size: usize,
    /// Maximum results returned to the caller
    #[validate(range(min = 1))]
    pub default_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            hybrid_search_enabled: true,
            // Open question resolved: dense and lexical start weighted evenly;
            // callers tune toward either side once they have query logs.
            alpha: 0.5,
            candidate_pool_size: 200,
            default_limit: 10,
        }
    }
}

/// Service-level policy flags that don't belong to any one subsystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    /// When `true`, every mutating call on the memory service and indexer
    /// returns `ReadOnly` immediately instead of writing.
    pub read_only: bool,
    /// When `true`, the active project is inferred from the caller's
    /// working directory's git root rather than requiring an explicit
    /// `set_active_project` call.
    pub auto_switch_project: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            auto_switch_project: false,
        }
    }
}

/// Root configuration aggregate.
///
/// # Example
///
/// ```rust
/// use claude_rag_engine::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.query.default_limit, 10);
/// assert!(config.query.alpha >= 0.0 && config.query.alpha <= 1.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Data directory layout
    #[validate(nested)]
    pub data: DataConfig,
    /// Connection pool tuning
    #[validate(nested)]
    pub pool: PoolConfig,
    /// Embedding provider configuration
    #[validate(nested)]
    pub embedding: EmbeddingConfig,
    /// Vector store configuration
    #[validate(nested)]
    pub vector_store: VectorStoreConfig,
    /// Embedding cache configuration
    #[validate(nested)]
    pub cache: CacheConfig,
    /// Parser limits
    #[validate(nested)]
    pub parser: ParserConfig,
    /// Incremental indexer tuning
    #[validate(nested)]
    pub indexer: IndexerConfig,
    /// Query engine tuning
    #[validate(nested)]
    pub query: QueryConfig,
    /// Cross-cutting service policy flags
    #[validate(nested)]
    pub service: ServiceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            pool: PoolConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            cache: CacheConfig::default(),
            parser: ParserConfig::default(),
            indexer: IndexerConfig::default(),
            query: QueryConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}
