//! In-memory [`VectorStoreProvider`] used by tests and offline fixtures.
//! Cosine similarity is computed directly rather than delegating to a real
//! index, since test fixtures are small.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::error::{Error, Result};
use crate::domain::ports::vector_store::{PayloadFilter, VectorMatch, VectorPoint, VectorStoreProvider};

struct Collection {
    dimensions: usize,
    points: HashMap<String, VectorPoint>,
}

/// Pure in-process vector store. Not persisted; one instance per test or
/// per short-lived process.
#[derive(Default)]
pub struct InMemoryVectorStoreProvider {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStoreProvider {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(payload: &serde_json::Value, filter: &PayloadFilter) -> bool {
    filter.must_match.iter().all(|(field, expected)| {
        payload
            .get(field)
            .map(|actual| actual == expected)
            .unwrap_or(false)
    })
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStoreProvider for InMemoryVectorStoreProvider {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write();
        match collections.get(collection) {
            Some(existing) if existing.dimensions != dimensions => {
                Err(Error::schema_mismatch(
                    collection,
                    dimensions.to_string(),
                    existing.dimensions.to_string(),
                ))
            }
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    collection.to_string(),
                    Collection {
                        dimensions,
                        points: HashMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::not_found(format!("collection '{collection}'")))?;
        for point in points {
            if point.vector.len() != coll.dimensions {
                return Err(Error::schema_mismatch(
                    collection,
                    coll.dimensions.to_string(),
                    point.vector.len().to_string(),
                ));
            }
            coll.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<PayloadFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| Error::not_found(format!("collection '{collection}'")))?;
        let mut scored: Vec<VectorMatch> = coll
            .points
            .values()
            .filter(|p| filter.as_ref().map(|f| matches_filter(&p.payload, f)).unwrap_or(true))
            .map(|p| VectorMatch {
                id: p.id.clone(),
                score: cosine_similarity(query, &p.vector),
                payload: p.payload.clone(),
                vector: None,
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<PayloadFilter>,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<(Vec<VectorMatch>, Option<String>)> {
        let collections = self.collections.read();
        let coll = match collections.get(collection) {
            Some(c) => c,
            None => return Ok((Vec::new(), None)),
        };
        let mut ids: Vec<&String> = coll
            .points
            .values()
            .filter(|p| filter.as_ref().map(|f| matches_filter(&p.payload, f)).unwrap_or(true))
            .map(|p| &p.id)
            .collect();
        ids.sort();

        let start = match &cursor {
            Some(after) => ids.partition_point(|id| id.as_str() <= after.as_str()),
            None => 0,
        };
        let page: Vec<&String> = ids[start..].iter().take(limit).copied().collect();
        let next_cursor = if start + page.len() < ids.len() {
            page.last().map(|id| (*id).clone())
        } else {
            None
        };
        let matches = page
            .into_iter()
            .filter_map(|id| coll.points.get(id))
            .map(|p| VectorMatch {
                id: p.id.clone(),
                score: 0.0,
                payload: p.payload.clone(),
                vector: Some(p.vector.clone()),
            })
            .collect();
        Ok((matches, next_cursor))
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write();
        if let Some(coll) = collections.get_mut(collection) {
            for id in ids {
                coll.points.remove(id);
            }
        }
        Ok(())
    }

    async fn delete_by_filter(&self, collection: &str, filter: PayloadFilter) -> Result<u64> {
        let mut collections = self.collections.write();
        let coll = match collections.get_mut(collection) {
            Some(c) => c,
            None => return Ok(0),
        };
        let to_remove: Vec<String> = coll
            .points
            .values()
            .filter(|p| matches_filter(&p.payload, &filter))
            .map(|p| p.id.clone())
            .collect();
        for id in &to_remove {
            coll.points.remove(id);
        }
        Ok(to_remove.len() as u64)
    }

    async fn count(&self, collection: &str, filter: Option<PayloadFilter>) -> Result<u64> {
        let collections = self.collections.read();
        let coll = match collections.get(collection) {
            Some(c) => c,
            None => return Ok(0),
        };
        let count = coll
            .points
            .values()
            .filter(|p| filter.as_ref().map(|f| matches_filter(&p.payload, f)).unwrap_or(true))
            .count();
        Ok(count as u64)
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.collections.write().remove(collection);
        Ok(())
    }
}
