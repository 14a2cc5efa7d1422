//! Qdrant vector index backend.
//!
//! Provides [`QdrantVectorIndex`] which implements [`VectorIndex`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! # Example
//!
//! ```rust,ignore
//! use mria_rag::qdrant::QdrantVectorIndex;
//!
//! let index = QdrantVectorIndex::new("http://localhost:6334", None)?;
//! index.create_collection("user1", CollectionSchema::new(1024, DistanceMetric::Dot)).await?;
//! index.upsert("user1", &points).await?;
//! let hits = index.search("user1", &query_vector, 5).await?;
//! ```

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, GetPointsBuilder,
    PointId, PointStruct, PointsIdsList, Range, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::ServiceEndpoints;
use crate::error::{RagError, Result};
use crate::vectorindex::{
    CollectionInfo, CollectionSchema, DistanceMetric, Point, PointPayload, ScoredPoint,
    VectorIndex, check_top_k,
};

const BACKEND: &str = "qdrant";

/// Payload key holding the order in which a point id was first written.
const INSERTED_SEQ: &str = "inserted_seq";

/// Extra hits fetched beyond `top_k` so equal scores at the cut-off can be
/// reordered by insertion before truncating.
const TIE_MARGIN: u64 = 16;

/// A [`VectorIndex`] backed by [Qdrant](https://qdrant.tech/).
///
/// Collection schemas are cached after the first lookup since they never
/// change. Writes use `wait(true)` so an `Ok` means the points are
/// searchable. Each point carries an `inserted_seq` payload field, kept
/// across overwrites, and search orders equal scores by it.
pub struct QdrantVectorIndex {
    client: Qdrant,
    on_disk_vectors: bool,
    schemas: RwLock<HashMap<String, CollectionSchema>>,
}

impl QdrantVectorIndex {
    /// Connect to the Qdrant gRPC endpoint at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Qdrant::from_url(url).api_key(api_key).build().map_err(Self::map_err)?;
        Ok(Self::from_client(client))
    }

    /// Connect using [`ServiceEndpoints::qdrant_url`] and its API key.
    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Result<Self> {
        Self::new(&endpoints.qdrant_url, endpoints.qdrant_api_key.clone())
    }

    /// Wrap an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client, on_disk_vectors: true, schemas: RwLock::new(HashMap::new()) }
    }

    /// Store vectors of newly created collections on disk (default) or in RAM.
    pub fn with_on_disk_vectors(mut self, on_disk: bool) -> Self {
        self.on_disk_vectors = on_disk;
        self
    }

    fn map_err(e: QdrantError) -> RagError {
        RagError::VectorIndexUnavailable { backend: BACKEND.to_string(), message: e.to_string() }
    }

    /// Map an error from a call against `collection`, recognising "not found".
    fn map_collection_err(collection: &str, e: QdrantError) -> RagError {
        let message = e.to_string();
        if message.contains("doesn't exist") || message.contains("Not found") {
            RagError::collection_not_found(collection)
        } else {
            RagError::VectorIndexUnavailable { backend: BACKEND.to_string(), message }
        }
    }

    fn to_distance(metric: DistanceMetric) -> Distance {
        match metric {
            DistanceMetric::Cosine => Distance::Cosine,
            DistanceMetric::Dot => Distance::Dot,
        }
    }

    fn from_distance(distance: i32) -> Result<DistanceMetric> {
        match Distance::try_from(distance) {
            Ok(Distance::Cosine) => Ok(DistanceMetric::Cosine),
            Ok(Distance::Dot) => Ok(DistanceMetric::Dot),
            other => Err(RagError::VectorIndexUnavailable {
                backend: BACKEND.to_string(),
                message: format!("unsupported distance {other:?}"),
            }),
        }
    }

    /// Fetch schema and point count from the server.
    async fn fetch_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        if !self.client.collection_exists(name).await.map_err(Self::map_err)? {
            return Ok(None);
        }
        let response = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| Self::map_collection_err(name, e))?;
        let info = response.result.ok_or_else(|| RagError::collection_not_found(name))?;

        let params = info
            .config
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);
        let Some(VectorsConfigKind::Params(params)) = params else {
            return Err(RagError::VectorIndexUnavailable {
                backend: BACKEND.to_string(),
                message: format!("collection '{name}' does not use a single unnamed vector"),
            });
        };

        let schema =
            CollectionSchema::new(params.size as usize, Self::from_distance(params.distance)?);
        self.schemas.write().await.insert(name.to_string(), schema);

        Ok(Some(CollectionInfo {
            name: name.to_string(),
            schema,
            points_count: info.points_count.unwrap_or_default(),
        }))
    }

    async fn schema(&self, name: &str) -> Result<CollectionSchema> {
        if let Some(schema) = self.schemas.read().await.get(name) {
            return Ok(*schema);
        }
        self.fetch_info(name)
            .await?
            .map(|info| info.schema)
            .ok_or_else(|| RagError::collection_not_found(name))
    }

    fn check_dimension(collection: &str, schema: CollectionSchema, actual: usize) -> Result<()> {
        if actual != schema.dimension {
            return Err(RagError::DimensionMismatch {
                collection: collection.to_string(),
                expected: schema.dimension,
                actual,
            });
        }
        Ok(())
    }

    fn to_point_struct(point: &Point, inserted_seq: i64) -> Result<PointStruct> {
        let payload = serde_json::to_value(&point.payload)
            .map_err(|e| RagError::InvalidArgument(format!("unserialisable payload: {e}")))?;
        let mut payload = Payload::try_from(payload).map_err(Self::map_err)?;
        payload.insert(INSERTED_SEQ, inserted_seq);
        Ok(PointStruct::new(point.id.clone(), point.vector.clone(), payload))
    }

    fn point_id_string(id: &PointId) -> Option<String> {
        match &id.point_id_options {
            Some(PointIdOptions::Uuid(s)) => Some(s.clone()),
            Some(PointIdOptions::Num(n)) => Some(n.to_string()),
            None => None,
        }
    }

    /// Sequence numbers already stored for any of `ids`.
    async fn stored_seqs(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<HashMap<String, i64>> {
        let point_ids: Vec<PointId> = ids.iter().map(|id| id.clone().into()).collect();
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(collection, point_ids).with_payload(true).with_vectors(false),
            )
            .await
            .map_err(|e| Self::map_collection_err(collection, e))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point.id.as_ref().and_then(Self::point_id_string)?;
                let seq = point.payload.get(INSERTED_SEQ).and_then(Self::extract_seq)?;
                Some((id, seq))
            })
            .collect())
    }

    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn extract_index(value: &QdrantValue) -> Option<usize> {
        match &value.kind {
            Some(Kind::IntegerValue(i)) => usize::try_from(*i).ok(),
            Some(Kind::DoubleValue(d)) if *d >= 0.0 => Some(*d as usize),
            _ => None,
        }
    }

    fn extract_seq(value: &QdrantValue) -> Option<i64> {
        match &value.kind {
            Some(Kind::IntegerValue(i)) => Some(*i),
            _ => None,
        }
    }

    fn conflict(name: &str, existing: CollectionSchema, requested: CollectionSchema) -> RagError {
        RagError::DimensionConflict { collection: name.to_string(), existing, requested }
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, name: &str, schema: CollectionSchema) -> Result<()> {
        if let Some(info) = self.fetch_info(name).await? {
            if info.schema != schema {
                return Err(Self::conflict(name, info.schema, schema));
            }
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        let created = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(
                    VectorParamsBuilder::new(
                        schema.dimension as u64,
                        Self::to_distance(schema.metric),
                    )
                    .on_disk(self.on_disk_vectors),
                ),
            )
            .await;

        if let Err(e) = created {
            // Lost a creation race: accept it if the winner used our schema.
            warn!(collection = name, error = %e, "qdrant collection creation failed, re-checking");
            return match self.fetch_info(name).await? {
                Some(info) if info.schema == schema => Ok(()),
                Some(info) => Err(Self::conflict(name, info.schema, schema)),
                None => Err(Self::map_err(e)),
            };
        }

        self.schemas.write().await.insert(name.to_string(), schema);
        debug!(collection = name, %schema, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.schemas.write().await.remove(name);
        if !self.client.collection_exists(name).await.map_err(Self::map_err)? {
            return Ok(());
        }
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        self.fetch_info(name).await
    }

    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<()> {
        let schema = self.schema(collection).await?;
        for point in points {
            Self::check_dimension(collection, schema, point.vector.len())?;
        }
        if points.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
        let stored = self.stored_seqs(collection, &ids).await?;
        let seqs = assign_seqs(&ids, &stored, now_nanos());
        let structs = points
            .iter()
            .zip(seqs)
            .map(|(point, seq)| Self::to_point_struct(point, seq))
            .collect::<Result<Vec<_>>>()?;
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, structs).wait(true))
            .await
            .map_err(|e| Self::map_collection_err(collection, e))?;

        debug!(collection, count = points.len(), "upserted points to qdrant");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<qdrant_client::qdrant::PointId> =
            ids.iter().map(|id| id.clone().into()).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(|e| Self::map_collection_err(collection, e))?;

        debug!(collection, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    async fn delete_document(
        &self,
        collection: &str,
        document_id: &str,
        from_chunk_index: usize,
    ) -> Result<()> {
        let filter = Filter::must([
            Condition::matches("document_id", document_id.to_string()),
            Condition::range(
                "chunk_index",
                Range { gte: Some(from_chunk_index as f64), ..Default::default() },
            ),
        ]);

        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(filter).wait(true))
            .await
            .map_err(|e| Self::map_collection_err(collection, e))?;

        debug!(collection, document_id, from_chunk_index, "deleted document points from qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>> {
        check_top_k(top_k)?;
        let schema = self.schema(collection).await?;
        Self::check_dimension(collection, schema, query.len())?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, query.to_vec(), top_k as u64 + TIE_MARGIN)
                    .with_payload(true),
            )
            .await
            .map_err(|e| Self::map_collection_err(collection, e))?;

        let hits = response
            .result
            .into_iter()
            .map(|scored| {
                let id = scored.id.as_ref().and_then(Self::point_id_string).unwrap_or_default();

                let fields = &scored.payload;
                let payload = PointPayload {
                    text: fields.get("text").and_then(Self::extract_string).unwrap_or_default(),
                    document_id: fields
                        .get("document_id")
                        .and_then(Self::extract_string)
                        .unwrap_or_default(),
                    chunk_index: fields
                        .get("chunk_index")
                        .and_then(Self::extract_index)
                        .unwrap_or_default(),
                };

                let seq = fields.get(INSERTED_SEQ).and_then(Self::extract_seq).unwrap_or(i64::MAX);

                (ScoredPoint { id, payload, score: scored.score }, seq)
            })
            .collect();

        Ok(order_ties(hits, top_k))
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Keep the stored sequence of ids written before; number new ids from
/// `base` in batch order.
fn assign_seqs(ids: &[String], stored: &HashMap<String, i64>, base: i64) -> Vec<i64> {
    ids.iter()
        .enumerate()
        .map(|(offset, id)| {
            stored.get(id).copied().unwrap_or_else(|| base.saturating_add(offset as i64))
        })
        .collect()
}

/// Sort by score, then by insertion sequence, and keep the first `top_k`.
fn order_ties(mut hits: Vec<(ScoredPoint, i64)>, top_k: usize) -> Vec<ScoredPoint> {
    hits.sort_by(|(a, a_seq), (b, b_seq)| {
        b.score.total_cmp(&a.score).then_with(|| a_seq.cmp(b_seq))
    });
    hits.into_iter().take(top_k).map(|(hit, _)| hit).collect()
}
