//! Production [`VectorStoreProvider`] backed by `qdrant-client`.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, PointsIdsList, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;

use crate::domain::error::{Error, Result};
use crate::domain::ports::vector_store::{PayloadFilter, VectorMatch, VectorPoint, VectorStoreProvider};

/// Thin wrapper over a `qdrant_client::Qdrant` connection.
pub struct QdrantVectorStoreProvider {
    client: Qdrant,
}

impl QdrantVectorStoreProvider {
    /// Connects to the Qdrant gRPC endpoint at `url` (e.g.
    /// `http://127.0.0.1:6334`).
    pub fn connect(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| Error::TransportError {
                endpoint: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn json_to_qdrant_value(value: &serde_json::Value) -> qdrant_client::qdrant::Value {
    match value {
        serde_json::Value::Null => ().into(),
        serde_json::Value::Bool(b) => (*b).into(),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or(0.0).into()
            }
        }
        serde_json::Value::String(s) => s.clone().into(),
        other => other.to_string().into(),
    }
}

fn payload_to_qdrant_map(payload: &serde_json::Value) -> HashMap<String, qdrant_client::qdrant::Value> {
    payload
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn qdrant_payload_to_json(
    payload: HashMap<String, qdrant_client::qdrant::Value>,
) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_client::qdrant::Value::from(v).into()))
        .collect();
    serde_json::Value::Object(map)
}

fn scored_point_to_match(point: ScoredPoint) -> Option<VectorMatch> {
    let id = match point.id?.point_id_options? {
        qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u) => u,
        qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => n.to_string(),
    };
    Some(VectorMatch {
        id,
        score: point.score,
        payload: qdrant_payload_to_json(point.payload),
        vector: None,
    })
}

fn vectors_output_to_vec(vectors: Option<qdrant_client::qdrant::VectorsOutput>) -> Option<Vec<f32>> {
    use qdrant_client::qdrant::vectors_output::VectorsOptions;
    match vectors?.vectors_options? {
        VectorsOptions::Vector(v) => Some(v.data),
        _ => None,
    }
}

fn filter_to_qdrant(filter: PayloadFilter) -> Filter {
    let conditions: Vec<Condition> = filter
        .must_match
        .into_iter()
        .map(|(field, value)| match value {
            serde_json::Value::String(s) => Condition::matches(field, s),
            serde_json::Value::Number(n) if n.is_i64() => Condition::matches(field, n.as_i64().unwrap()),
            other => Condition::matches(field, other.to_string()),
        })
        .collect();
    Filter::must(conditions)
}

#[async_trait]
impl VectorStoreProvider for QdrantVectorStoreProvider {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| Error::VectorDb { message: e.to_string() })?;

        if exists {
            let info = self
                .client
                .collection_info(collection)
                .await
                .map_err(|e| Error::VectorDb { message: e.to_string() })?;
            let existing_dim = info
                .result
                .and_then(|r| r.config)
                .and_then(|c| c.params)
                .and_then(|p| p.vectors_config)
                .and_then(|vc| vc.config)
                .and_then(|cfg| match cfg {
                    qdrant_client::qdrant::vectors_config::Config::Params(p) => Some(p.size as usize),
                    _ => None,
                });
            if let Some(existing_dim) = existing_dim {
                if existing_dim != dimensions {
                    return Err(Error::schema_mismatch(
                        collection,
                        dimensions.to_string(),
                        existing_dim.to_string(),
                    ));
                }
            }
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine))
                    .on_disk_payload(true),
            )
            .await
            .map_err(|e| Error::VectorDb { message: e.to_string() })?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| PointStruct::new(p.id, p.vector, payload_to_qdrant_map(&p.payload)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, qdrant_points).wait(true))
            .await
            .map_err(|e| Error::VectorDb { message: e.to_string() })?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<PayloadFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let mut builder = SearchPointsBuilder::new(collection, query.to_vec(), limit as u64)
            .with_payload(true);
        if let Some(filter) = filter {
            if !filter.is_empty() {
                builder = builder.filter(filter_to_qdrant(filter));
            }
        }
        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::VectorDb { message: e.to_string() })?;
        Ok(response.result.into_iter().filter_map(scored_point_to_match).collect())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<PayloadFilter>,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<(Vec<VectorMatch>, Option<String>)> {
        use qdrant_client::qdrant::ScrollPointsBuilder;

        let mut builder = ScrollPointsBuilder::new(collection)
            .limit(limit as u32)
            .with_payload(true)
            .with_vectors(true);
        if let Some(filter) = filter {
            if !filter.is_empty() {
                builder = builder.filter(filter_to_qdrant(filter));
            }
        }
        if let Some(cursor) = cursor {
            builder = builder.offset(PointId::from(cursor));
        }

        let response = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| Error::VectorDb { message: e.to_string() })?;

        let next_cursor = response.next_page_offset.and_then(|id| match id.point_id_options {
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => Some(u),
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => Some(n.to_string()),
            None => None,
        });

        let matches = response
            .result
            .into_iter()
            .map(|point| {
                let id = match point.id.clone().and_then(|id| id.point_id_options) {
                    Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
                    Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
                    None => String::new(),
                };
                VectorMatch {
                    id,
                    score: 0.0,
                    vector: vectors_output_to_vec(point.vectors.clone()),
                    payload: qdrant_payload_to_json(point.payload),
                }
            })
            .collect();

        Ok((matches, next_cursor))
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<PointId> = ids.iter().cloned().map(PointId::from).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(|e| Error::VectorDb { message: e.to_string() })?;
        Ok(())
    }

    async fn delete_by_filter(&self, collection: &str, filter: PayloadFilter) -> Result<u64> {
        let before = self.count(collection, Some(filter.clone())).await?;
        if before == 0 {
            return Ok(0);
        }
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(filter_to_qdrant(filter))
                    .wait(true),
            )
            .await
            .map_err(|e| Error::VectorDb { message: e.to_string() })?;
        Ok(before)
    }

    async fn count(&self, collection: &str, filter: Option<PayloadFilter>) -> Result<u64> {
        use qdrant_client::qdrant::CountPointsBuilder;
        let mut builder = CountPointsBuilder::new(collection).exact(true);
        if let Some(filter) = filter {
            if !filter.is_empty() {
                builder = builder.filter(filter_to_qdrant(filter));
            }
        }
        let response = self
            .client
            .count(builder)
            .await
            .map_err(|e| Error::VectorDb { message: e.to_string() })?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.client
            .delete_collection(collection)
            .await
            .map_err(|e| Error::VectorDb { message: e.to_string() })?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map_err(|e| Error::TransportError {
                endpoint: "qdrant".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
