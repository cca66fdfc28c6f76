//! The memory service orchestrator (C9): the high-level store/retrieve/
//! list/update/delete surface clients actually call, wiring C3 (vector
//! store), C5 (embedding), C8 (query engine), the relationship graph, and
//! the active-project pointer together (spec.md §4.9).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::adapters::embedding::CachedEmbeddingEngine;
use crate::domain::error::{Error, Result};
use crate::domain::payload::{memory_from_payload, memory_to_payload};
use crate::domain::ports::vector_store::{PayloadFilter, SharedVectorStoreProvider, VectorPoint};
use crate::domain::types::{
    ContextLevel, DetectedBy, Memory, MemoryCategory, MemoryScope, Provenance, ProvenanceSource,
    Relationship, RelationshipKind,
};
use crate::memory::active_project::ActiveProjectStore;
use crate::memory::relationships::RelationshipStore;
use crate::query::{QueryEngine, RetrieveReport, RetrieveRequest};

const PAGE_SIZE: usize = 256;

/// Inputs for [`MemoryService::store`] / [`MemoryService::store_batch`].
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub content: String,
    pub category: MemoryCategory,
    pub project_name: Option<String>,
    pub scope: MemoryScope,
    pub context_level: ContextLevel,
    pub importance: f32,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, Value>,
    pub provenance_source: ProvenanceSource,
}

impl StoreRequest {
    /// A global, core-level memory with default importance and no tags,
    /// attributed to explicit user input.
    pub fn new(content: impl Into<String>, category: MemoryCategory) -> Self {
        Self {
            content: content.into(),
            category,
            project_name: None,
            scope: MemoryScope::Global,
            context_level: ContextLevel::Core,
            importance: 0.5,
            tags: Vec::new(),
            metadata: HashMap::new(),
            provenance_source: ProvenanceSource::UserExplicit,
        }
    }
}

/// A partial update to an existing memory. `id`, `created_at`, and `scope`
/// are never patched here (scope changes go through [`MemoryService::migrate_scope`]).
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub category: Option<MemoryCategory>,
    pub importance: Option<f32>,
    pub tags: Option<Vec<String>>,
    pub context_level: Option<ContextLevel>,
    pub metadata: Option<HashMap<String, Value>>,
}

/// Point-in-time counts for a single project.
#[derive(Debug, Clone)]
pub struct ProjectStats {
    pub project_name: String,
    pub memory_count: u64,
    pub code_unit_count: u64,
}

/// High-level store/retrieve/list/update/delete surface over a single
/// collection's worth of memories.
pub struct MemoryService {
    vector_store: SharedVectorStoreProvider,
    embedding: Arc<CachedEmbeddingEngine>,
    query_engine: Arc<QueryEngine>,
    relationships: Arc<RelationshipStore>,
    active_project: Arc<ActiveProjectStore>,
    collection: String,
    dimensions: usize,
    read_only: bool,
}

impl MemoryService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vector_store: SharedVectorStoreProvider,
        embedding: Arc<CachedEmbeddingEngine>,
        query_engine: Arc<QueryEngine>,
        relationships: Arc<RelationshipStore>,
        active_project: Arc<ActiveProjectStore>,
        collection: String,
        dimensions: usize,
        read_only: bool,
    ) -> Self {
        Self {
            vector_store,
            embedding,
            query_engine,
            relationships,
            active_project,
            collection,
            dimensions,
            read_only,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::read_only("memory service"));
        }
        Ok(())
    }

    fn build_memory(&self, request: StoreRequest) -> Result<Memory> {
        let provenance = Provenance::from_source(request.provenance_source);
        Memory::new(
            request.content,
            request.category,
            request.project_name,
            request.scope,
            request.context_level,
            request.importance,
            request.tags,
            provenance,
            request.metadata,
        )
    }

    /// Stores one memory, rejecting empty content and any mutation while
    /// `read_only`.
    pub async fn store(&self, request: StoreRequest) -> Result<Uuid> {
        self.check_writable()?;
        let memory = self.build_memory(request)?;
        self.vector_store.ensure_collection(&self.collection, self.dimensions).await?;
        let vector = self.embedding.generate(&memory.content).await?;
        let id = memory.id;
        let payload = memory_to_payload(&memory);
        self.vector_store
            .upsert(&self.collection, vec![VectorPoint { id: id.to_string(), vector, payload }])
            .await?;
        Ok(id)
    }

    /// Stores many memories in a single upsert round-trip: either all
    /// succeed, or a transport error fails the whole batch.
    pub async fn store_batch(&self, requests: Vec<StoreRequest>) -> Result<Vec<Uuid>> {
        self.check_writable()?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let memories: Vec<Memory> = requests
            .into_iter()
            .map(|r| self.build_memory(r))
            .collect::<Result<Vec<_>>>()?;

        self.vector_store.ensure_collection(&self.collection, self.dimensions).await?;
        let contents: Vec<String> = memories.iter().map(|m| m.content.clone()).collect();
        let vectors = self.embedding.batch_generate(&contents, false).await?;
        let ids: Vec<Uuid> = memories.iter().map(|m| m.id).collect();
        let points: Vec<VectorPoint> = memories
            .iter()
            .zip(vectors)
            .map(|(m, vector)| VectorPoint { id: m.id.to_string(), vector, payload: memory_to_payload(m) })
            .collect();
        self.vector_store.upsert(&self.collection, points).await?;
        Ok(ids)
    }

    /// Delegates to the query engine (C8).
    pub async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveReport> {
        self.query_engine.retrieve(request).await
    }

    async fn fetch_with_vector(&self, id: Uuid) -> Result<Option<(Memory, Vec<f32>)>> {
        let (matches, _) = self
            .vector_store
            .scroll(&self.collection, Some(PayloadFilter::eq("id", id.to_string())), None, 1)
            .await?;
        let Some(m) = matches.into_iter().next() else { return Ok(None) };
        let vector = m.vector.ok_or_else(|| {
            Error::vector_db(format!("scroll did not return a vector for memory '{id}'"))
        })?;
        let memory = memory_from_payload(id, &m.payload)?;
        Ok(Some((memory, vector)))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Memory>> {
        Ok(self.fetch_with_vector(id).await?.map(|(memory, _)| memory))
    }

    /// Paginates the collection, optionally filtered, skipping `offset`
    /// matches before collecting up to `limit`.
    pub async fn list(&self, filters: Option<PayloadFilter>, limit: usize, offset: usize) -> Result<Vec<Memory>> {
        let mut skipped = 0usize;
        let mut collected = Vec::new();
        let mut cursor = None;
        loop {
            let (matches, next) = self.vector_store.scroll(&self.collection, filters.clone(), cursor, PAGE_SIZE).await?;
            if matches.is_empty() {
                break;
            }
            for m in matches {
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                if collected.len() >= limit {
                    break;
                }
                let Ok(id) = Uuid::parse_str(&m.id) else { continue };
                if let Ok(memory) = memory_from_payload(id, &m.payload) {
                    collected.push(memory);
                }
            }
            if collected.len() >= limit {
                break;
            }
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(collected)
    }

    /// Applies `patch` to an existing memory, preserving `id`, `created_at`,
    /// and `scope`. Re-embeds when `content` changes.
    pub async fn update(&self, id: Uuid, patch: MemoryPatch) -> Result<Memory> {
        self.check_writable()?;
        let (mut memory, mut vector) = self
            .fetch_with_vector(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("memory '{id}'")))?;

        let content_changed = patch.content.is_some();
        if let Some(content) = patch.content {
            memory.content = content;
        }
        if let Some(category) = patch.category {
            memory.category = category;
        }
        if let Some(importance) = patch.importance {
            memory.importance = importance;
        }
        if let Some(tags) = patch.tags {
            memory.tags = tags;
        }
        if let Some(context_level) = patch.context_level {
            memory.context_level = context_level;
        }
        if let Some(metadata) = patch.metadata {
            memory.metadata = metadata;
        }
        memory.updated_at = Utc::now();
        memory.validate()?;

        if content_changed {
            vector = self.embedding.generate(&memory.content).await?;
        }
        let payload = memory_to_payload(&memory);
        self.vector_store
            .upsert(&self.collection, vec![VectorPoint { id: id.to_string(), vector, payload }])
            .await?;
        Ok(memory)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.check_writable()?;
        self.vector_store.delete_by_ids(&self.collection, &[id.to_string()]).await?;
        self.relationships.delete_for_memory(id).await?;
        Ok(())
    }

    pub async fn delete_many(&self, ids: &[Uuid]) -> Result<()> {
        self.check_writable()?;
        let id_strs: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.vector_store.delete_by_ids(&self.collection, &id_strs).await?;
        for id in ids {
            self.relationships.delete_for_memory(*id).await?;
        }
        Ok(())
    }

    /// Changes a memory's project/global membership; `None` migrates it to
    /// global scope.
    pub async fn migrate_scope(&self, id: Uuid, new_project_name: Option<String>) -> Result<Memory> {
        self.check_writable()?;
        let (mut memory, vector) = self
            .fetch_with_vector(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("memory '{id}'")))?;
        memory.scope = if new_project_name.is_some() { MemoryScope::Project } else { MemoryScope::Global };
        memory.project_name = new_project_name;
        memory.updated_at = Utc::now();
        memory.validate()?;
        let payload = memory_to_payload(&memory);
        self.vector_store
            .upsert(&self.collection, vec![VectorPoint { id: id.to_string(), vector, payload }])
            .await?;
        Ok(memory)
    }

    /// Rewrites `context_level` for every memory matching `filters`, page
    /// by page; each page's upsert is atomic, the sweep as a whole is not.
    pub async fn bulk_reclassify(&self, filters: Option<PayloadFilter>, new_context_level: ContextLevel) -> Result<u64> {
        self.check_writable()?;
        let mut count = 0u64;
        let mut cursor = None;
        loop {
            let (matches, next) = self.vector_store.scroll(&self.collection, filters.clone(), cursor, PAGE_SIZE).await?;
            if matches.is_empty() {
                break;
            }
            let mut points = Vec::with_capacity(matches.len());
            for m in matches {
                let vector = m.vector.ok_or_else(|| {
                    Error::vector_db(format!("scroll did not return a vector for point '{}'", m.id))
                })?;
                let Ok(id) = Uuid::parse_str(&m.id) else { continue };
                let mut memory = memory_from_payload(id, &m.payload)?;
                memory.context_level = new_context_level;
                memory.updated_at = Utc::now();
                points.push(VectorPoint { id: m.id, vector, payload: memory_to_payload(&memory) });
            }
            count += points.len() as u64;
            self.vector_store.upsert(&self.collection, points).await?;
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(count)
    }

    /// Groups a project's memories whose vectors are pairwise cosine-similar
    /// above `similarity_threshold`. Pairwise, so intended for a single
    /// project's corpus rather than the whole collection.
    pub async fn find_duplicates(&self, project: &str, similarity_threshold: f32) -> Result<Vec<Vec<Uuid>>> {
        let filter = PayloadFilter::eq("project_name", project);
        let mut items: Vec<(Uuid, Vec<f32>)> = Vec::new();
        let mut cursor = None;
        loop {
            let (matches, next) = self.vector_store.scroll(&self.collection, Some(filter.clone()), cursor, PAGE_SIZE).await?;
            if matches.is_empty() {
                break;
            }
            for m in matches {
                if let (Ok(id), Some(vector)) = (Uuid::parse_str(&m.id), m.vector) {
                    items.push((id, vector));
                }
            }
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        let n = items.len();
        let mut parent: Vec<usize> = (0..n).collect();
        for i in 0..n {
            for j in (i + 1)..n {
                if cosine_similarity(&items[i].1, &items[j].1) >= similarity_threshold {
                    union(&mut parent, i, j);
                }
            }
        }

        let mut groups: HashMap<usize, Vec<Uuid>> = HashMap::new();
        for i in 0..n {
            let root = find(&mut parent, i);
            groups.entry(root).or_default().push(items[i].0);
        }
        Ok(groups.into_values().filter(|g| g.len() > 1).collect())
    }

    /// Concatenates content, unions tags/metadata, deletes the losing
    /// memories, and repoints their relationships onto `keep_id`.
    pub async fn merge(&self, ids: &[Uuid], keep_id: Uuid) -> Result<Memory> {
        self.check_writable()?;
        if !ids.contains(&keep_id) {
            return Err(Error::invalid_argument(format!("keep_id '{keep_id}' must be one of the merged ids")));
        }
        let (mut keep, keep_vector) = self
            .fetch_with_vector(keep_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("memory '{keep_id}'")))?;

        let mut losers = Vec::new();
        for &id in ids {
            if id == keep_id {
                continue;
            }
            let (loser, _) = self
                .fetch_with_vector(id)
                .await?
                .ok_or_else(|| Error::not_found(format!("memory '{id}'")))?;
            losers.push(loser);
        }

        for loser in &losers {
            if !keep.content.contains(&loser.content) {
                keep.content.push_str("\n\n");
                keep.content.push_str(&loser.content);
            }
            for tag in &loser.tags {
                if !keep.tags.contains(tag) {
                    keep.tags.push(tag.clone());
                }
            }
            for (k, v) in &loser.metadata {
                keep.metadata.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        keep.updated_at = Utc::now();
        keep.validate()?;

        for loser in &losers {
            self.relationships.repoint(loser.id, keep_id).await?;
        }
        let loser_ids: Vec<String> = losers.iter().map(|l| l.id.to_string()).collect();
        if !loser_ids.is_empty() {
            self.vector_store.delete_by_ids(&self.collection, &loser_ids).await?;
        }

        let payload = memory_to_payload(&keep);
        self.vector_store
            .upsert(&self.collection, vec![VectorPoint { id: keep_id.to_string(), vector: keep_vector, payload }])
            .await?;
        Ok(keep)
    }

    pub async fn add_relationship(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        kind: RelationshipKind,
        confidence: f32,
    ) -> Result<()> {
        self.check_writable()?;
        let relationship = Relationship::new(source_id, target_id, kind, confidence, DetectedBy::User)?;
        self.relationships.add(relationship).await
    }

    /// Every distinct `project_name` seen across the collection.
    pub async fn list_projects(&self) -> Result<Vec<String>> {
        let mut projects = std::collections::BTreeSet::new();
        let mut cursor = None;
        loop {
            let (matches, next) = self.vector_store.scroll(&self.collection, None, cursor, PAGE_SIZE).await?;
            if matches.is_empty() {
                break;
            }
            for m in &matches {
                if let Some(name) = m.payload.get("project_name").and_then(Value::as_str) {
                    projects.insert(name.to_string());
                }
            }
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(projects.into_iter().collect())
    }

    pub async fn project_stats(&self, name: &str) -> Result<ProjectStats> {
        let filter = PayloadFilter::eq("project_name", name);
        let memory_count = self.vector_store.count(&self.collection, Some(filter.clone())).await?;
        let code_unit_count = self
            .vector_store
            .count(&self.collection, Some(filter.and_eq("category", "code")))
            .await?;
        Ok(ProjectStats { project_name: name.to_string(), memory_count, code_unit_count })
    }

    pub async fn delete_project(&self, name: &str) -> Result<u64> {
        self.check_writable()?;
        let removed = crate::adapters::vector_store::delete_project(self.vector_store.as_ref(), &self.collection, name).await?;
        self.active_project.clear_if(name).await?;
        Ok(removed)
    }

    pub async fn rename_project(&self, old_name: &str, new_name: &str) -> Result<u64> {
        self.check_writable()?;
        let count =
            crate::adapters::vector_store::rename_project(self.vector_store.as_ref(), &self.collection, old_name, new_name).await?;
        if self.active_project.get().await?.as_deref() == Some(old_name) {
            self.active_project.set(Some(new_name.to_string())).await?;
        }
        Ok(count)
    }

    pub async fn set_active_project(&self, name: Option<String>) -> Result<()> {
        self.active_project.set(name).await
    }

    pub async fn get_active_project(&self) -> Result<Option<String>> {
        self.active_project.get().await
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn find(parent: &mut [usize], x: usize) -> usize {
    if parent[x] != x {
        parent[x] = find(parent, parent[x]);
    }
    parent[x]
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra] = rb;
    }
}
