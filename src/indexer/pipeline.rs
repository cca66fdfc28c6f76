//! The incremental indexer's orchestrator: strings together discovery,
//! change detection, parsing, embedding, and upsert per spec.md §4.7.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::adapters::embedding::CachedEmbeddingEngine;
use crate::config::{IndexerConfig, ParserConfig};
use crate::domain::error::{Error, Result};
use crate::domain::payload::memory_to_payload;
use crate::domain::ports::vector_store::{PayloadFilter, SharedVectorStoreProvider, VectorPoint};
use crate::domain::types::{ContextLevel, Language, Memory, MemoryCategory, MemoryScope, Provenance, ProvenanceSource, SemanticUnit};
use crate::indexer::discover::discover_files;
use crate::indexer::file_index::FileIndexStore;
use crate::parser::extract_units;

/// Outcome of indexing a single file.
#[derive(Debug, Clone)]
pub enum FileOutcome {
    /// The file was parsed, embedded, and upserted.
    Indexed {
        /// Number of semantic units extracted and stored
        units: usize,
    },
    /// The file's content hash matched the last-indexed hash; nothing to do.
    Skipped {
        /// Human-readable reason, e.g. `"unchanged hash"`
        reason: String,
    },
    /// The file failed at some step; other files are unaffected.
    Failed {
        /// Description of the failure
        error: String,
    },
}

/// Aggregate result of an [`IndexingService::index_project`] sweep.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// Total files discovered under the walked roots
    pub files_total: usize,
    /// Files that were parsed, embedded, and upserted
    pub files_indexed: usize,
    /// Files skipped because their hash was unchanged
    pub files_skipped: usize,
    /// `(path, error message)` pairs for files that failed
    pub files_failed: Vec<(String, String)>,
    /// Total semantic units embedded and upserted across all files
    pub units_indexed: u64,
}

/// Receives throttled progress updates during a sweep. The reporter is a
/// collaborator, not the source of truth (spec.md §4.7) — a dropped or
/// slow reporter never blocks or corrupts indexing.
pub trait IndexProgressReporter: Send + Sync {
    /// Called after each file completes (indexed, skipped, or failed).
    fn on_progress(&self, files_total: usize, files_done: usize, units_indexed: u64);
}

/// Reporter that does nothing; the default when no caller-supplied
/// reporter is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressReporter;

impl IndexProgressReporter for NoopProgressReporter {
    fn on_progress(&self, _files_total: usize, _files_done: usize, _units_indexed: u64) {}
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn unit_to_memory(
    unit: &SemanticUnit,
    project_name: &str,
    file_path: &str,
    file_hash: &str,
) -> Result<Memory> {
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("file_path".to_string(), serde_json::json!(file_path));
    metadata.insert("language".to_string(), serde_json::json!(unit.language.as_str()));
    metadata.insert("unit_type".to_string(), serde_json::json!(unit.unit_type.as_str()));
    metadata.insert("start_line".to_string(), serde_json::json!(unit.start_line));
    metadata.insert("end_line".to_string(), serde_json::json!(unit.end_line));
    metadata.insert("file_hash".to_string(), serde_json::json!(file_hash));

    let mut memory = Memory::new(
        unit.content.clone(),
        MemoryCategory::Code,
        Some(project_name.to_string()),
        MemoryScope::Project,
        ContextLevel::Detail,
        0.5,
        vec![],
        Provenance::from_source(ProvenanceSource::AutoClassified),
        metadata,
    )?;
    // The point id is derived deterministically from the unit's identity,
    // not the random uuid `Memory::new` assigned, so re-indexing an
    // unchanged unit always lands on the same point (idempotent upsert).
    memory.id = SemanticUnit::derive_memory_id(
        Some(project_name),
        file_path,
        unit.unit_type,
        &unit.name,
        unit.start_line,
    );
    Ok(memory)
}

/// Orchestrates the full per-file pipeline (spec.md §4.7 steps 1-8) and the
/// project-level sweep and maintenance operations built on top of it.
pub struct IndexingService {
    vector_store: SharedVectorStoreProvider,
    embedding: Arc<CachedEmbeddingEngine>,
    file_index: Arc<FileIndexStore>,
    collection: String,
    parser_config: ParserConfig,
    indexer_config: IndexerConfig,
    dimensions: usize,
}

impl IndexingService {
    /// Builds an indexer writing into `collection` (already the correct
    /// per-project or per-worker name; see [`crate::config::worker_collection_name`]).
    pub fn new(
        vector_store: SharedVectorStoreProvider,
        embedding: Arc<CachedEmbeddingEngine>,
        file_index: Arc<FileIndexStore>,
        collection: String,
        parser_config: ParserConfig,
        indexer_config: IndexerConfig,
        dimensions: usize,
    ) -> Self {
        Self {
            vector_store,
            embedding,
            file_index,
            collection,
            parser_config,
            indexer_config,
            dimensions,
        }
    }

    fn code_file_filter(project_name: &str, file_path: &str) -> PayloadFilter {
        PayloadFilter::eq("project_name", project_name)
            .and_eq("category", "code")
            .and_eq("file_path", file_path)
    }

    /// Runs the full per-file pipeline for one file (spec.md §4.7 steps
    /// 2-8; discovery and binary detection already happened in the caller).
    pub async fn index_file(&self, project_name: &str, path: &Path) -> Result<FileOutcome> {
        let file_path = path.to_string_lossy().to_string();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::parse_failed(&file_path, format!("failed to read file: {e}")))?;
        let file_hash = sha256_hex(&bytes);

        let previous_hash = self.file_index.last_hash(project_name, &file_path).await?;
        if previous_hash.as_deref() == Some(file_hash.as_str()) {
            return Ok(FileOutcome::Skipped { reason: "unchanged hash".to_string() });
        }

        let source = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                return Err(Error::parse_failed(&file_path, format!("not valid UTF-8: {e}")));
            }
        };

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let language = Language::from_extension(extension);
        let units = extract_units(&source, language, &self.parser_config);

        self.vector_store
            .ensure_collection(&self.collection, self.dimensions)
            .await?;

        // Delete-before-reinsert (step 5): bounds the orphan window to
        // this call, and makes re-running the pipeline idempotent even if
        // it previously crashed between delete and upsert.
        self.vector_store
            .delete_by_filter(&self.collection, Self::code_file_filter(project_name, &file_path))
            .await?;

        if units.is_empty() {
            self.file_index.record(project_name, &file_path, &file_hash, 0).await?;
            return Ok(FileOutcome::Indexed { units: 0 });
        }

        let memories: Vec<Memory> = units
            .iter()
            .map(|u| unit_to_memory(u, project_name, &file_path, &file_hash))
            .collect::<Result<Vec<_>>>()?;

        let contents: Vec<String> = units.iter().map(|u| u.content.clone()).collect();
        let vectors = self.embedding.batch_generate(&contents, false).await.map_err(|e| {
            Error::embedding_failed(file_path.chars().take(64).collect::<String>(), e.to_string())
        })?;

        let points: Vec<VectorPoint> = memories
            .iter()
            .zip(vectors)
            .map(|(memory, vector)| VectorPoint {
                id: memory.id.to_string(),
                vector,
                payload: memory_to_payload(memory),
            })
            .collect();

        self.vector_store.upsert(&self.collection, points).await?;
        self.file_index
            .record(project_name, &file_path, &file_hash, memories.len())
            .await?;

        Ok(FileOutcome::Indexed { units: memories.len() })
    }

    /// Walks `root`, honoring ignore rules and built-in excludes, and
    /// indexes every discovered file, bounded by `indexer.concurrency`
    /// files in flight at once (spec.md §4.7 "Parallelism across files").
    pub async fn index_project(
        &self,
        project_name: &str,
        root: &Path,
        reporter: &dyn IndexProgressReporter,
    ) -> Result<IndexReport> {
        let files = discover_files(
            root,
            &self.indexer_config.builtin_excludes,
            self.indexer_config.binary_sniff_bytes,
        )?;
        let files_total = files.len();
        let done = std::sync::atomic::AtomicUsize::new(0);
        let units_total = std::sync::atomic::AtomicU64::new(0);

        let concurrency = self.indexer_config.concurrency.max(1);
        let outcomes: Vec<(String, FileOutcome)> = stream::iter(files.into_iter())
            .map(|path| {
                let file_path = path.to_string_lossy().to_string();
                async move {
                    let outcome = match self.index_file(project_name, &path).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(file = %file_path, error = %e, "failed to index file");
                            FileOutcome::Failed { error: e.to_string() }
                        }
                    };
                    (file_path, outcome)
                }
            })
            .buffer_unordered(concurrency)
            .inspect(|(_, outcome)| {
                let delta_units = match outcome {
                    FileOutcome::Indexed { units } => *units as u64,
                    _ => 0,
                };
                let files_done = done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                let units_done = units_total.fetch_add(delta_units, std::sync::atomic::Ordering::SeqCst) + delta_units;
                reporter.on_progress(files_total, files_done, units_done);
            })
            .collect()
            .await;

        let mut report = IndexReport { files_total, ..Default::default() };
        for (path, outcome) in outcomes {
            match outcome {
                FileOutcome::Indexed { units } => {
                    report.files_indexed += 1;
                    report.units_indexed += units as u64;
                }
                FileOutcome::Skipped { .. } => report.files_skipped += 1,
                FileOutcome::Failed { error } => report.files_failed.push((path, error)),
            }
        }
        info!(
            files_total = report.files_total,
            files_indexed = report.files_indexed,
            files_skipped = report.files_skipped,
            files_failed = report.files_failed.len(),
            units_indexed = report.units_indexed,
            "index sweep complete"
        );
        Ok(report)
    }

    /// Deletes every code-category unit under `(project_name, path)` and
    /// removes the file-index row, without re-indexing.
    pub async fn delete_file_index(&self, project_name: &str, path: &Path) -> Result<()> {
        let file_path = path.to_string_lossy().to_string();
        self.vector_store
            .delete_by_filter(&self.collection, Self::code_file_filter(project_name, &file_path))
            .await?;
        self.file_index.remove(project_name, &file_path).await?;
        Ok(())
    }

    /// Deletes all memories for `project_name`, clears its file-index rows,
    /// then indexes `root` fresh. This is a hard reset: every file is
    /// re-parsed, re-embedded, and re-upserted on every call (the cleared
    /// file-index row means each file looks unseen to `index_file`'s
    /// hash check), not just the files that actually changed since the
    /// last sweep. Two back-to-back calls with unchanged file contents
    /// therefore both report every file as `Indexed`, and converge on the
    /// same persisted rows (same deterministic ids, vectors, and payload
    /// up to `updated_at`) rather than on zero file-level operations.
    pub async fn reindex_project(
        &self,
        project_name: &str,
        root: &Path,
        reporter: &dyn IndexProgressReporter,
    ) -> Result<IndexReport> {
        self.vector_store
            .delete_by_filter(&self.collection, PayloadFilter::eq("project_name", project_name))
            .await?;
        self.file_index.clear_project(project_name).await?;
        debug!(project = project_name, "cleared project state, starting fresh sweep");
        self.index_project(project_name, root, reporter).await
    }

    /// Default embedding-cache TTL carried by this service's engine, for
    /// callers that want to show freshness in diagnostics.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(30 * 24 * 60 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::TieredCacheProvider;
    use crate::adapters::embedding::MockEmbeddingProvider;
    use crate::adapters::vector_store::InMemoryVectorStoreProvider;
    use tempfile::tempdir;

    fn service(dir: &tempfile::TempDir) -> IndexingService {
        let cache = Arc::new(TieredCacheProvider::open(&dir.path().join("cache.db"), 1000).unwrap());
        let embedding = Arc::new(CachedEmbeddingEngine::new(
            Arc::new(MockEmbeddingProvider::new(8)),
            cache,
            "mock-model".to_string(),
            Duration::from_secs(3600),
            10,
            2,
            false,
        ));
        let vector_store: SharedVectorStoreProvider = Arc::new(InMemoryVectorStoreProvider::new());
        let file_index = Arc::new(FileIndexStore::open(&dir.path().join("metadata.db")).unwrap());
        IndexingService::new(
            vector_store,
            embedding,
            file_index,
            "test_collection".to_string(),
            ParserConfig::default(),
            IndexerConfig::default(),
            8,
        )
    }

    #[tokio::test]
    async fn indexes_a_rust_function_and_skips_on_second_pass() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        let file = dir.path().join("lib.rs");
        std::fs::write(&file, "fn authenticate(user: &str, password: &str) -> bool {\n    user == password\n}\n").unwrap();

        let first = svc.index_file("demo", &file).await.unwrap();
        assert!(matches!(first, FileOutcome::Indexed { units: 1 }));

        let second = svc.index_file("demo", &file).await.unwrap();
        assert!(matches!(second, FileOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn reindexing_after_a_change_replaces_units_not_duplicates_them() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        let file = dir.path().join("lib.rs");
        std::fs::write(&file, "fn a() {}\n").unwrap();
        svc.index_file("demo", &file).await.unwrap();

        std::fs::write(&file, "fn a() {}\nfn b() {}\n").unwrap();
        let outcome = svc.index_file("demo", &file).await.unwrap();
        assert!(matches!(outcome, FileOutcome::Indexed { units: 2 }));

        let count = svc
            .vector_store
            .count(&svc.collection, Some(PayloadFilter::eq("project_name", "demo")))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn index_project_walks_directory_and_reports_counts() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        std::fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}\nfn c() {}\n").unwrap();

        let report = svc.index_project("demo", dir.path(), &NoopProgressReporter).await.unwrap();
        assert_eq!(report.files_total, 2);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.units_indexed, 3);
        assert!(report.files_failed.is_empty());
    }

    #[tokio::test]
    async fn reindex_project_twice_in_a_row_converges_on_the_same_store_state() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        std::fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();

        let first = svc.reindex_project("demo", dir.path(), &NoopProgressReporter).await.unwrap();
        // A hard reset: the file-index row was just cleared, so `index_file`
        // sees no previous hash and re-indexes every file on every call,
        // not just the ones that changed.
        assert_eq!(first.files_indexed, 1);
        assert_eq!(first.files_skipped, 0);

        let first_ids: Vec<String> = svc
            .vector_store
            .scroll(&svc.collection, Some(PayloadFilter::eq("project_name", "demo")), None, 256)
            .await
            .unwrap()
            .0
            .into_iter()
            .map(|m| m.id)
            .collect();

        let second = svc.reindex_project("demo", dir.path(), &NoopProgressReporter).await.unwrap();
        assert_eq!(second.files_indexed, 1);
        assert_eq!(second.files_skipped, 0);

        // Net mutation on the persisted state is zero: same deterministic
        // ids reappear, and the count is unchanged (spec.md §8's "second
        // call's net mutations = 0" is about the converged store state,
        // not the number of delete/insert operations performed).
        let second_ids: Vec<String> = svc
            .vector_store
            .scroll(&svc.collection, Some(PayloadFilter::eq("project_name", "demo")), None, 256)
            .await
            .unwrap()
            .0
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn delete_file_index_removes_units_and_row() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "fn a() {}\n").unwrap();
        svc.index_file("demo", &file).await.unwrap();

        svc.delete_file_index("demo", &file).await.unwrap();
        let count = svc
            .vector_store
            .count(&svc.collection, Some(PayloadFilter::eq("project_name", "demo")))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(svc.file_index.last_hash("demo", &file.to_string_lossy()).await.unwrap(), None);
    }
}
