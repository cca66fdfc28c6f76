//! Vector store adapter (C3): a `qdrant-client` production backend plus an
//! in-memory test double, both behind [`VectorStoreProvider`].
//!
//! The Qdrant wrapper's builder-based call shape (`CreateCollectionBuilder`,
//! `UpsertPointsBuilder`, `SearchPointsBuilder`, ...) is grounded on the
//! sibling cache repo's direct `qdrant_client::Qdrant` usage.

mod in_memory;
mod qdrant;

pub use in_memory::InMemoryVectorStoreProvider;
pub use qdrant::QdrantVectorStoreProvider;

use crate::domain::error::Result;
use crate::domain::ports::vector_store::VectorStoreProvider;

const RENAME_PAGE_SIZE: usize = 256;

/// Renames a project by rewriting every point's `project_name` payload
/// field in place: scroll the whole collection page by page, flip the
/// field, and re-upsert. Implemented against the trait surface so it
/// works for any backend, not just Qdrant.
///
/// This is a composite operation, not a primitive of [`VectorStoreProvider`]
/// itself, since it requires scanning the full collection rather than a
/// single filtered write.
pub async fn rename_project(
    store: &dyn VectorStoreProvider,
    collection: &str,
    old_name: &str,
    new_name: &str,
) -> Result<u64> {
    use crate::domain::ports::vector_store::{PayloadFilter, VectorPoint};

    let filter = PayloadFilter::eq("project_name", old_name);
    let mut count = 0u64;
    let mut cursor = None;
    loop {
        let (matches, next_cursor) = store
            .scroll(collection, Some(filter.clone()), cursor, RENAME_PAGE_SIZE)
            .await?;
        if matches.is_empty() {
            break;
        }
        let mut points = Vec::with_capacity(matches.len());
        for m in matches {
            let vector = m.vector.ok_or_else(|| {
                crate::domain::error::Error::vector_db(format!(
                    "scroll did not return a vector for point '{}'; cannot rewrite its payload without one",
                    m.id
                ))
            })?;
            let mut payload = m.payload;
            if let Some(obj) = payload.as_object_mut() {
                obj.insert(
                    "project_name".to_string(),
                    serde_json::Value::String(new_name.to_string()),
                );
            }
            points.push(VectorPoint { id: m.id, vector, payload });
        }
        count += points.len() as u64;
        store.upsert(collection, points).await?;
        match next_cursor {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }
    Ok(count)
}

/// Deletes every point belonging to `project_name` and verifies the
/// collection is empty of that project afterward via a post-count.
pub async fn delete_project(
    store: &dyn VectorStoreProvider,
    collection: &str,
    project_name: &str,
) -> Result<u64> {
    use crate::domain::ports::vector_store::PayloadFilter;

    let filter = PayloadFilter::eq("project_name", project_name);
    let removed = store.delete_by_filter(collection, filter.clone()).await?;
    let remaining = store.count(collection, Some(filter)).await?;
    if remaining != 0 {
        return Err(crate::domain::error::Error::conflict(
            collection,
            format!("{remaining} points for project '{project_name}' survived deletion"),
        ));
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::vector_store::VectorPoint;

    #[tokio::test]
    async fn rename_project_rewrites_payload_field() {
        let store = InMemoryVectorStoreProvider::new();
        let dim = crate::domain::types::EmbeddingModel::default().dimensions();
        store.ensure_collection("demo", dim).await.unwrap();
        store
            .upsert(
                "demo",
                vec![VectorPoint {
                    id: "1".to_string(),
                    vector: vec![0.1; dim],
                    payload: serde_json::json!({"project_name": "old"}),
                }],
            )
            .await
            .unwrap();

        rename_project(&store, "demo", "old", "new").await.unwrap();

        let remaining_old = store
            .count(
                "demo",
                Some(crate::domain::ports::vector_store::PayloadFilter::eq(
                    "project_name",
                    "old",
                )),
            )
            .await
            .unwrap();
        assert_eq!(remaining_old, 0);
    }

    #[tokio::test]
    async fn delete_project_removes_all_matching_points() {
        let store = InMemoryVectorStoreProvider::new();
        let dim = crate::domain::types::EmbeddingModel::default().dimensions();
        store.ensure_collection("demo", dim).await.unwrap();
        store
            .upsert(
                "demo",
                vec![VectorPoint {
                    id: "1".to_string(),
                    vector: vec![0.1; dim],
                    payload: serde_json::json!({"project_name": "gone"}),
                }],
            )
            .await
            .unwrap();

        let removed = delete_project(&store, "demo", "gone").await.unwrap();
        assert_eq!(removed, 1);
    }
}
