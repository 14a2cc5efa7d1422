//! Vector index trait and the types stored in it.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::{Embedding, dot, l2_norm};
use crate::error::{RagError, Result};

/// Namespace for deterministic point ids.
const POINT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d72_6961_2d72_6167_8a3c_51f0_e2b4_9d17);

/// Longest accepted collection name.
pub const MAX_COLLECTION_NAME_LEN: usize = 255;

/// Similarity measure a collection is created with.
///
/// Scores are "higher is more similar" for every metric. Cosine and dot
/// product agree when all stored vectors are unit length, which
/// [`Embedding`] guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity.
    Cosine,
    /// Dot product.
    #[default]
    Dot,
}

impl DistanceMetric {
    /// Score `stored` against `query`.
    pub fn score(self, stored: &[f32], query: &[f32]) -> f32 {
        match self {
            Self::Dot => dot(stored, query),
            Self::Cosine => {
                let denom = l2_norm(stored) * l2_norm(query);
                if denom == 0.0 { 0.0 } else { dot(stored, query) / denom }
            }
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
        })
    }
}

/// Fixed parameters of a collection, set at creation and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Length of every vector in the collection.
    pub dimension: usize,
    /// Similarity measure used by search.
    pub metric: DistanceMetric,
}

impl CollectionSchema {
    /// Create a schema.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self { dimension, metric }
    }
}

impl fmt::Display for CollectionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-d {}", self.dimension, self.metric)
    }
}

/// Snapshot of a collection's schema and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Creation-time parameters.
    pub schema: CollectionSchema,
    /// Number of stored points.
    pub points_count: u64,
}

/// Data stored alongside a vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPayload {
    /// The chunk text returned to the retriever.
    pub text: String,
    /// The document the chunk was cut from.
    pub document_id: String,
    /// Position of the chunk in its document.
    pub chunk_index: usize,
}

/// A vector plus payload, stored in exactly one collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    /// Point id; see [`Point::id_for`].
    pub id: String,
    /// The embedding.
    pub vector: Vec<f32>,
    /// The chunk text and its provenance.
    pub payload: PointPayload,
}

impl Point {
    /// Deterministic id of chunk `chunk_index` of `document_id`.
    ///
    /// Ids are UUIDv5 strings, accepted by every backend. Re-ingesting the
    /// same document produces the same ids and overwrites in place.
    pub fn id_for(document_id: &str, chunk_index: usize) -> String {
        Uuid::new_v5(&POINT_ID_NAMESPACE, format!("{document_id}:{chunk_index}").as_bytes())
            .to_string()
    }

    /// Build the point for one embedded chunk.
    pub fn from_chunk(
        document_id: &str,
        chunk_index: usize,
        text: impl Into<String>,
        embedding: Embedding,
    ) -> Self {
        Self {
            id: Self::id_for(document_id, chunk_index),
            vector: embedding.into_vec(),
            payload: PointPayload {
                text: text.into(),
                document_id: document_id.to_string(),
                chunk_index,
            },
        }
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    /// Point id.
    pub id: String,
    /// Stored payload.
    pub payload: PointPayload,
    /// Similarity under the collection metric (higher is more similar).
    pub score: f32,
}

/// A per-collection nearest-neighbour store.
///
/// Each user's documents live in their own collection. Implementations
/// never search more than one collection per call.
///
/// # Example
///
/// ```rust,ignore
/// use mria_rag::{CollectionSchema, DistanceMetric, InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.create_collection("user1", CollectionSchema::new(1024, DistanceMetric::Dot)).await?;
/// index.upsert("user1", &points).await?;
/// let hits = index.search("user1", &query_vector, 5).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name used in logs and error messages.
    fn backend(&self) -> &str;

    /// Create a collection.
    ///
    /// A no-op if it already exists with the same schema; fails with
    /// [`RagError::DimensionConflict`] if it exists with another one.
    async fn create_collection(&self, name: &str, schema: CollectionSchema) -> Result<()>;

    /// Delete a collection and all its points. A no-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Return schema and size of a collection, or `None` if it does not exist.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Insert or replace points by id.
    ///
    /// Fails with [`RagError::CollectionNotFound`] if the collection does not
    /// exist and with [`RagError::DimensionMismatch`] if any vector has the
    /// wrong length; in both cases nothing is written.
    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<()>;

    /// Delete points by id. Unknown ids are ignored.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// Delete the points of `document_id` whose chunk index is at least
    /// `from_chunk_index`.
    async fn delete_document(
        &self,
        collection: &str,
        document_id: &str,
        from_chunk_index: usize,
    ) -> Result<()>;

    /// Return up to `top_k` points ordered by non-increasing score, equal
    /// scores in the order their ids were first written.
    ///
    /// Fails with [`RagError::InvalidArgument`] if `top_k == 0`, with
    /// [`RagError::CollectionNotFound`] if the collection does not exist and
    /// with [`RagError::DimensionMismatch`] if the query has the wrong length.
    async fn search(&self, collection: &str, query: &[f32], top_k: usize)
    -> Result<Vec<ScoredPoint>>;
}

/// Check a collection name: 1..=255 ASCII alphanumerics, `-` or `_`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if name.is_empty() || name.len() > MAX_COLLECTION_NAME_LEN || !valid_chars {
        return Err(RagError::InvalidArgument(format!(
            "invalid collection name '{name}': use 1-{MAX_COLLECTION_NAME_LEN} ASCII letters, digits, '-' or '_'"
        )));
    }
    Ok(())
}

/// Reject `top_k == 0`.
pub(crate) fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(RagError::InvalidArgument("top_k must be greater than zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic_and_distinct() {
        assert_eq!(Point::id_for("doc", 0), Point::id_for("doc", 0));
        assert_ne!(Point::id_for("doc", 0), Point::id_for("doc", 1));
        assert_ne!(Point::id_for("doc", 1), Point::id_for("doc1", 0));
        assert!(Uuid::parse_str(&Point::id_for("doc", 3)).is_ok());
    }

    #[test]
    fn collection_names() {
        assert!(validate_collection_name("user_1-a").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("a b").is_err());
        assert!(validate_collection_name("../etc").is_err());
        assert!(validate_collection_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn metrics_agree_on_unit_vectors() {
        let a = Embedding::normalize(vec![1.0, 2.0, 3.0]).unwrap();
        let b = Embedding::normalize(vec![3.0, 1.0, 0.5]).unwrap();
        let cosine = DistanceMetric::Cosine.score(a.as_slice(), b.as_slice());
        let dot = DistanceMetric::Dot.score(a.as_slice(), b.as_slice());
        assert!((cosine - dot).abs() < 1e-5);
    }
}
