//! Query engine (C8): expansion, dense + lexical retrieval, fusion,
//! ranking, touch, and explanation/quality scoring (spec.md §4.8).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::adapters::embedding::CachedEmbeddingEngine;
use crate::config::QueryConfig;
use crate::domain::error::{Error, Result};
use crate::domain::payload::memory_from_payload;
use crate::domain::ports::query_expander::SharedQueryExpander;
use crate::domain::ports::vector_store::{PayloadFilter, SharedVectorStoreProvider, VectorPoint};
use crate::domain::types::Memory;
use crate::query::bm25::Bm25Index;
use crate::query::fusion::{fuse_scores, rank_and_trim, FusedCandidate};

/// Which retrieval strategy `retrieve` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Dense vector search only.
    Semantic,
    /// Dense + BM25 lexical, fused by `alpha`.
    Hybrid,
    /// No embedding at all; `filters` alone selects results via `scroll`.
    FilterOnly,
}

/// A single query's inputs.
#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub query: String,
    pub filters: Option<PayloadFilter>,
    pub limit: usize,
    pub mode: RetrievalMode,
    /// Overrides `QueryConfig::alpha` for this call when set.
    pub alpha: Option<f32>,
    /// The caller's currently active project, if any, purely for the
    /// "in active project P" explanation clause.
    pub active_project: Option<String>,
    /// Optional hard deadline; exceeding it surfaces `Timeout` rather than
    /// partial results (spec.md §5 cancellation).
    pub deadline: Option<Duration>,
}

impl RetrieveRequest {
    /// A semantic-mode request with no filter, deadline, or project context.
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            filters: None,
            limit,
            mode: RetrievalMode::Semantic,
            alpha: None,
            active_project: None,
            deadline: None,
        }
    }
}

/// One ranked result with its score and human-readable explanation.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub memory: Memory,
    pub score: f32,
    pub explanation: Vec<String>,
}

/// Coarse quality signal for the whole result set, by top score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityBucket {
    Excellent,
    Good,
    Moderate,
    Low,
    NoResults,
}

impl QualityBucket {
    fn from_top_score(top_score: Option<f32>) -> Self {
        match top_score {
            None => QualityBucket::NoResults,
            Some(s) if s >= 0.85 => QualityBucket::Excellent,
            Some(s) if s >= 0.70 => QualityBucket::Good,
            Some(s) if s >= 0.55 => QualityBucket::Moderate,
            Some(_) => QualityBucket::Low,
        }
    }

    /// Actionable suggestions shown alongside this bucket.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            QualityBucket::Excellent | QualityBucket::Good => &[],
            QualityBucket::Moderate => &["refine query", "narrow the project filter"],
            QualityBucket::Low => &["refine query", "check project name", "verify indexing"],
            QualityBucket::NoResults => &["check project name", "verify indexing", "broaden filters"],
        }
    }
}

/// The outcome of a `retrieve` call.
#[derive(Debug, Clone)]
pub struct RetrieveReport {
    pub results: Vec<RetrievedMemory>,
    pub quality: QualityBucket,
}

const SCROLL_PAGE_SIZE: usize = 256;

/// Orchestrates a single `retrieve` call across expansion, dense/lexical
/// search, fusion, ranking, touch, and explanation.
pub struct QueryEngine {
    vector_store: SharedVectorStoreProvider,
    embedding: Arc<CachedEmbeddingEngine>,
    expander: SharedQueryExpander,
    config: QueryConfig,
    collection: String,
}

impl QueryEngine {
    pub fn new(
        vector_store: SharedVectorStoreProvider,
        embedding: Arc<CachedEmbeddingEngine>,
        expander: SharedQueryExpander,
        config: QueryConfig,
        collection: String,
    ) -> Self {
        Self { vector_store, embedding, expander, config, collection }
    }

    /// Runs a full retrieve call, honoring `request.deadline` as a hard
    /// timeout (spec.md §5: "the query path raises Timeout rather than
    /// returning partial results").
    pub async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveReport> {
        match request.deadline {
            Some(deadline) => {
                let started = Instant::now();
                match tokio::time::timeout(deadline, self.retrieve_inner(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::timeout("retrieve", started.elapsed().as_millis() as u64)),
                }
            }
            None => self.retrieve_inner(&request).await,
        }
    }

    async fn retrieve_inner(&self, request: &RetrieveRequest) -> Result<RetrieveReport> {
        if request.limit == 0 {
            return Ok(RetrieveReport { results: Vec::new(), quality: QualityBucket::NoResults });
        }

        if request.mode == RetrievalMode::FilterOnly {
            return self.retrieve_filter_only(request).await;
        }

        // EXPANDING
        let expanded = self.expander.expand(&request.query).await?;
        let primary_query = expanded.first().cloned().unwrap_or_else(|| request.query.clone());

        // SEARCHING (dense)
        let candidate_k = (request.limit * 3).min(50).max(request.limit);
        let query_vector = self.embedding.generate(&primary_query).await?;
        let dense_matches = self
            .vector_store
            .search(&self.collection, &query_vector, candidate_k, request.filters.clone())
            .await?;
        let dense_scores: Vec<(String, f32)> = dense_matches.iter().map(|m| (m.id.clone(), m.score)).collect();

        // SEARCHING (lexical, hybrid only) + FUSING
        let lex_scores = if request.mode == RetrievalMode::Hybrid && self.config.hybrid_search_enabled {
            self.lexical_scores(&primary_query, request.filters.clone()).await?
        } else {
            Vec::new()
        };

        let alpha = request.alpha.unwrap_or(self.config.alpha);
        let fused = if lex_scores.is_empty() {
            dense_scores.iter().cloned().collect::<std::collections::HashMap<_, _>>()
        } else {
            fuse_scores(&dense_scores, &lex_scores, alpha)
        };

        // Reconstruct candidate memories (payload is already on hand from
        // dense_matches; lexical-only hits need a payload fetch).
        let mut payloads: std::collections::HashMap<String, serde_json::Value> =
            dense_matches.into_iter().map(|m| (m.id, m.payload)).collect();
        for (id, _) in &lex_scores {
            if !payloads.contains_key(id) {
                if let Some(payload) = self.fetch_payload(id).await? {
                    payloads.insert(id.clone(), payload);
                }
            }
        }

        let mut candidates = Vec::with_capacity(fused.len());
        let mut memories: std::collections::HashMap<String, Memory> = std::collections::HashMap::new();
        for (id, score) in &fused {
            let Some(payload) = payloads.get(id) else { continue };
            let uuid = match uuid::Uuid::parse_str(id) {
                Ok(u) => u,
                Err(_) => continue,
            };
            let memory = match memory_from_payload(uuid, payload) {
                Ok(m) => m,
                Err(e) => {
                    warn!(id, error = %e, "skipping candidate with unreadable payload");
                    continue;
                }
            };
            candidates.push(FusedCandidate {
                id: id.clone(),
                score: *score,
                importance: memory.importance,
                last_accessed: memory.last_accessed,
            });
            memories.insert(id.clone(), memory);
        }

        // RANKING
        let ranked = rank_and_trim(candidates, request.limit);

        // TOUCHING (fire-and-forget)
        self.touch(ranked.iter().map(|c| c.id.clone()).collect());

        // EXPLAIN & QUALITY
        let top_score = ranked.first().map(|c| c.score);
        let dense_by_id: std::collections::HashMap<&str, f32> =
            dense_scores.iter().map(|(id, s)| (id.as_str(), *s)).collect();
        let lex_by_id: std::collections::HashMap<&str, f32> =
            lex_scores.iter().map(|(id, s)| (id.as_str(), *s)).collect();

        let results = ranked
            .into_iter()
            .filter_map(|c| {
                let memory = memories.remove(&c.id)?;
                let explanation = explain(&memory, &c, dense_by_id.get(c.id.as_str()).copied(), lex_by_id.get(c.id.as_str()).copied(), request.active_project.as_deref());
                Some(RetrievedMemory { memory, score: c.score, explanation })
            })
            .collect();

        Ok(RetrieveReport { results, quality: QualityBucket::from_top_score(top_score) })
    }

    async fn retrieve_filter_only(&self, request: &RetrieveRequest) -> Result<RetrieveReport> {
        let (matches, _) = self
            .vector_store
            .scroll(&self.collection, request.filters.clone(), None, request.limit)
            .await?;
        let ids: Vec<String> = matches.iter().map(|m| m.id.clone()).collect();
        self.touch(ids);

        let results: Vec<RetrievedMemory> = matches
            .into_iter()
            .filter_map(|m| {
                let uuid = uuid::Uuid::parse_str(&m.id).ok()?;
                let memory = memory_from_payload(uuid, &m.payload).ok()?;
                let explanation = vec!["matched filter criteria".to_string()];
                Some(RetrievedMemory { memory, score: 0.0, explanation })
            })
            .collect();
        let quality = if results.is_empty() { QualityBucket::NoResults } else { QualityBucket::Good };
        Ok(RetrieveReport { results, quality })
    }

    async fn lexical_scores(&self, query: &str, filter: Option<PayloadFilter>) -> Result<Vec<(String, f32)>> {
        let (matches, _) = self
            .vector_store
            .scroll(&self.collection, filter, None, self.config.candidate_pool_size.min(SCROLL_PAGE_SIZE * 4))
            .await?;
        let documents: Vec<(String, String)> = matches
            .into_iter()
            .map(|m| {
                let content = m.payload.get("content").and_then(|v| v.as_str()).unwrap_or("").to_string();
                (m.id, content)
            })
            .collect();
        let index = Bm25Index::build(&documents);
        Ok(index.score(query))
    }

    async fn fetch_payload(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let (matches, _) = self
            .vector_store
            .scroll(&self.collection, Some(PayloadFilter::eq("id", id)), None, 1)
            .await?;
        Ok(matches.into_iter().next().map(|m| m.payload))
    }

    /// Increments `access_count`/`last_accessed` for the returned memories.
    /// Best-effort: failures are logged, never surfaced (spec.md §4.8 step
    /// 6, §5 "TOUCHING failures are logged, never raised").
    fn touch(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let store = self.vector_store.clone();
        let collection = self.collection.clone();
        tokio::spawn(async move {
            for id in ids {
                if let Err(e) = touch_one(&store, &collection, &id).await {
                    debug!(id, error = %e, "touch failed for retrieved memory, ignoring");
                }
            }
        });
    }
}

async fn touch_one(store: &SharedVectorStoreProvider, collection: &str, id: &str) -> Result<()> {
    let (matches, _) = store.scroll(collection, Some(PayloadFilter::eq("id", id)), None, 1).await?;
    let Some(m) = matches.into_iter().next() else { return Ok(()) };
    let Some(vector) = m.vector else { return Ok(()) };
    let uuid = uuid::Uuid::parse_str(id).map_err(|e| Error::invalid_argument(e.to_string()))?;
    let mut memory = memory_from_payload(uuid, &m.payload)?;
    memory.record_access();
    let payload = crate::domain::payload::memory_to_payload(&memory);
    store.upsert(collection, vec![VectorPoint { id: id.to_string(), vector, payload }]).await
}

fn explain(
    memory: &Memory,
    candidate: &FusedCandidate,
    dense_score: Option<f32>,
    lex_score: Option<f32>,
    active_project: Option<&str>,
) -> Vec<String> {
    let mut reasons = Vec::new();
    if let Some(score) = dense_score {
        reasons.push(format!("semantic match ({score:.2})"));
    }
    if let Some(score) = lex_score {
        if score > 0.0 {
            reasons.push(format!("lexical match ({score:.2})"));
        }
    }
    if let (Some(active), Some(project)) = (active_project, memory.project_name.as_deref()) {
        if active == project {
            reasons.push(format!("in active project {project}"));
        }
    }
    if memory.provenance.verified {
        reasons.push("verified by user".to_string());
    }
    if candidate.importance >= 0.8 {
        reasons.push(format!("high importance ({:.2})", candidate.importance));
    }
    if reasons.is_empty() {
        reasons.push(format!("matched with score {:.2}", candidate.score));
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::TieredCacheProvider;
    use crate::adapters::embedding::MockEmbeddingProvider;
    use crate::adapters::vector_store::InMemoryVectorStoreProvider;
    use crate::domain::ports::query_expander::NoopQueryExpander;
    use crate::domain::types::{ContextLevel, MemoryCategory, MemoryScope, Provenance, ProvenanceSource};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn make_engine(dir: &tempfile::TempDir) -> (QueryEngine, SharedVectorStoreProvider) {
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
        let engine = QueryEngine::new(
            vector_store.clone(),
            embedding,
            Arc::new(NoopQueryExpander),
            QueryConfig::default(),
            "test_collection".to_string(),
        );
        (engine, vector_store)
    }

    async fn seed(store: &SharedVectorStoreProvider, embedding: &CachedEmbeddingEngine, collection: &str, content: &str, importance: f32) -> String {
        let memory = Memory::new(
            content.to_string(),
            MemoryCategory::Fact,
            Some("demo".to_string()),
            MemoryScope::Project,
            ContextLevel::Core,
            importance,
            vec![],
            Provenance::from_source(ProvenanceSource::UserExplicit),
            HashMap::new(),
        )
        .unwrap();
        let vector = embedding.generate(content).await.unwrap();
        let payload = crate::domain::payload::memory_to_payload(&memory);
        store
            .upsert(collection, vec![VectorPoint { id: memory.id.to_string(), vector, payload }])
            .await
            .unwrap();
        memory.id.to_string()
    }

    #[tokio::test]
    async fn limit_zero_returns_empty_without_touching_store() {
        let dir = tempdir().unwrap();
        let (engine, _) = make_engine(&dir);
        let report = engine.retrieve(RetrieveRequest::new("anything", 0)).await.unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.quality, QualityBucket::NoResults);
    }

    #[tokio::test]
    async fn semantic_retrieve_finds_seeded_memory() {
        let dir = tempdir().unwrap();
        let (engine, store) = make_engine(&dir);
        store.ensure_collection("test_collection", 8).await.unwrap();
        let cache = Arc::new(TieredCacheProvider::open(&dir.path().join("cache2.db"), 1000).unwrap());
        let embedding = CachedEmbeddingEngine::new(
            Arc::new(MockEmbeddingProvider::new(8)),
            cache,
            "mock-model".to_string(),
            Duration::from_secs(3600),
            10,
            2,
            false,
        );
        let id = seed(&store, &embedding, "test_collection", "fn authenticate(user, password)", 0.5).await;

        let report = engine.retrieve(RetrieveRequest::new("fn authenticate(user, password)", 5)).await.unwrap();
        assert!(!report.results.is_empty());
        assert_eq!(report.results[0].memory.id.to_string(), id);
        assert!(report.results[0].explanation.iter().any(|r| r.contains("semantic match")));
    }

    #[tokio::test]
    async fn filter_only_mode_never_embeds() {
        let dir = tempdir().unwrap();
        let (engine, store) = make_engine(&dir);
        store.ensure_collection("test_collection", 8).await.unwrap();
        let mut request = RetrieveRequest::new("unused", 5);
        request.mode = RetrievalMode::FilterOnly;
        request.filters = Some(PayloadFilter::eq("project_name", "demo"));
        let report = engine.retrieve(request).await.unwrap();
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn zero_deadline_surfaces_timeout_not_partial_results() {
        let dir = tempdir().unwrap();
        let (engine, store) = make_engine(&dir);
        store.ensure_collection("test_collection", 8).await.unwrap();
        let mut request = RetrieveRequest::new("anything", 5);
        request.deadline = Some(Duration::from_nanos(1));
        let err = engine.retrieve(request).await.unwrap_err();
        assert_eq!(err.kind_name(), "timeout");
    }
}
