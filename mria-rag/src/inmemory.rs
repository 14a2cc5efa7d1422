//! In-memory vector index.
//!
//! This module provides [`InMemoryVectorIndex`], a zero-dependency index
//! backed by `HashMap`s. It is suitable for development, testing, and
//! single-process deployments with small collections.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::vectorindex::{
    CollectionInfo, CollectionSchema, Point, ScoredPoint, VectorIndex, check_top_k,
};

const BACKEND: &str = "in-memory";

#[derive(Debug)]
struct StoredPoint {
    /// Insertion sequence; survives replacement so ties keep first-insert order.
    seq: u64,
    point: Point,
}

#[derive(Debug)]
struct Collection {
    schema: CollectionSchema,
    points: HashMap<String, StoredPoint>,
    next_seq: u64,
}

impl Collection {
    fn new(schema: CollectionSchema) -> Self {
        Self { schema, points: HashMap::new(), next_seq: 0 }
    }

    fn check_dimension(&self, name: &str, actual: usize) -> Result<()> {
        if actual != self.schema.dimension {
            return Err(RagError::DimensionMismatch {
                collection: name.to_string(),
                expected: self.schema.dimension,
                actual,
            });
        }
        Ok(())
    }
}

/// An in-memory [`VectorIndex`] with exact (brute-force) search.
///
/// The outer map is only locked to find or create a collection; each
/// collection has its own `tokio::sync::RwLock`, so traffic on one user's
/// collection never blocks another's. Every upsert is applied under a
/// single write guard and is therefore all-or-nothing.
///
/// # Example
///
/// ```rust,ignore
/// use mria_rag::{CollectionSchema, DistanceMetric, InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.create_collection("user1", CollectionSchema::new(384, DistanceMetric::Dot)).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Arc<RwLock<Collection>>>>,
}

impl InMemoryVectorIndex {
    /// Create a new empty in-memory index.
    pub fn new() -> Self {
        Self::default()
    }

    async fn collection(&self, name: &str) -> Result<Arc<RwLock<Collection>>> {
        self.collections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RagError::collection_not_found(name))
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, name: &str, schema: CollectionSchema) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(name) {
            let existing = existing.read().await.schema;
            if existing != schema {
                return Err(RagError::DimensionConflict {
                    collection: name.to_string(),
                    existing,
                    requested: schema,
                });
            }
            return Ok(());
        }
        collections.insert(name.to_string(), Arc::new(RwLock::new(Collection::new(schema))));
        debug!(collection = name, %schema, "created in-memory collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if self.collections.write().await.remove(name).is_some() {
            debug!(collection = name, "deleted in-memory collection");
        }
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let Some(collection) = self.collections.read().await.get(name).cloned() else {
            return Ok(None);
        };
        let collection = collection.read().await;
        Ok(Some(CollectionInfo {
            name: name.to_string(),
            schema: collection.schema,
            points_count: collection.points.len() as u64,
        }))
    }

    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<()> {
        let handle = self.collection(collection).await?;
        let mut store = handle.write().await;

        for point in points {
            store.check_dimension(collection, point.vector.len())?;
            if point.vector.iter().any(|x| !x.is_finite()) {
                return Err(RagError::InvalidArgument(format!(
                    "point '{}' has a non-finite component",
                    point.id
                )));
            }
        }

        for point in points {
            let existing_seq = store.points.get(&point.id).map(|stored| stored.seq);
            let seq = match existing_seq {
                Some(seq) => seq,
                None => {
                    store.next_seq += 1;
                    store.next_seq
                }
            };
            store.points.insert(point.id.clone(), StoredPoint { seq, point: point.clone() });
        }

        debug!(collection, count = points.len(), "upserted points");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let handle = self.collection(collection).await?;
        let mut store = handle.write().await;
        for id in ids {
            store.points.remove(id);
        }
        Ok(())
    }

    async fn delete_document(
        &self,
        collection: &str,
        document_id: &str,
        from_chunk_index: usize,
    ) -> Result<()> {
        let handle = self.collection(collection).await?;
        let mut store = handle.write().await;
        let before = store.points.len();
        store.points.retain(|_, stored| {
            let payload = &stored.point.payload;
            payload.document_id != document_id || payload.chunk_index < from_chunk_index
        });
        let removed = before - store.points.len();
        if removed > 0 {
            debug!(collection, document_id, from_chunk_index, removed, "deleted document points");
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>> {
        check_top_k(top_k)?;
        let handle = self.collection(collection).await?;
        let store = handle.read().await;
        store.check_dimension(collection, query.len())?;

        let metric = store.schema.metric;
        let mut scored: Vec<(f32, u64, &Point)> = store
            .points
            .values()
            .map(|stored| (metric.score(&stored.point.vector, query), stored.seq, &stored.point))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, _, point)| ScoredPoint {
                id: point.id.clone(),
                payload: point.payload.clone(),
                score,
            })
            .collect())
    }
}
