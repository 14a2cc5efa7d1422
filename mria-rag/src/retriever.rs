//! Query-time retrieval: embed the question, search one collection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::vectorindex::{ScoredPoint, VectorIndex};

/// A retrieved passage and its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The chunk text.
    pub text: String,
    /// Similarity under the collection metric (higher is more similar).
    pub score: f32,
    /// The document the chunk was cut from.
    pub document_id: String,
    /// Position of the chunk in its document.
    pub chunk_index: usize,
}

impl From<ScoredPoint> for RetrievedChunk {
    fn from(point: ScoredPoint) -> Self {
        Self {
            text: point.payload.text,
            score: point.score,
            document_id: point.payload.document_id,
            chunk_index: point.payload.chunk_index,
        }
    }
}

/// Ranked passages, most similar first.
///
/// An empty result means the collection was searched and nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetrievalResult(Vec<RetrievedChunk>);

impl RetrievalResult {
    /// Wrap chunks, sorting them by non-increasing score.
    ///
    /// The sort is stable, so equal scores keep their given order.
    pub fn new(mut chunks: Vec<RetrievedChunk>) -> Self {
        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self(chunks)
    }

    /// An empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedChunk> {
        self.0.iter()
    }

    /// The best match, if any.
    pub fn top(&self) -> Option<&RetrievedChunk> {
        self.0.first()
    }

    pub fn into_vec(self) -> Vec<RetrievedChunk> {
        self.0
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a RetrievedChunk;
    type IntoIter = std::slice::Iter<'a, RetrievedChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for RetrievalResult {
    type Item = RetrievedChunk;
    type IntoIter = std::vec::IntoIter<RetrievedChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Embeds a query and runs top-k search against a single collection.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    default_top_k: usize,
    max_top_k: usize,
    similarity_threshold: Option<f32>,
}

impl Retriever {
    /// Create a retriever returning 5 passages by default and at most 20.
    pub fn new(embedder: Arc<Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index, default_top_k: 5, max_top_k: 20, similarity_threshold: None }
    }

    /// Set the default and maximum `top_k`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] unless `1 <= default <= max`.
    pub fn with_top_k_bounds(mut self, default: usize, max: usize) -> Result<Self> {
        if default == 0 || default > max {
            return Err(RagError::InvalidArgument(format!(
                "top_k bounds must satisfy 1 <= default ({default}) <= max ({max})"
            )));
        }
        self.default_top_k = default;
        self.max_top_k = max;
        Ok(self)
    }

    /// Drop passages scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: Option<f32>) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Resolve a caller-supplied `top_k` against the default and the cap.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for `Some(0)`.
    pub fn effective_top_k(&self, top_k: Option<usize>) -> Result<usize> {
        match top_k {
            None => Ok(self.default_top_k),
            Some(0) => Err(RagError::InvalidArgument("top_k must be greater than zero".into())),
            Some(k) if k > self.max_top_k => {
                debug!(requested = k, max_top_k = self.max_top_k, "clamping top_k");
                Ok(self.max_top_k)
            }
            Some(k) => Ok(k),
        }
    }

    /// Retrieve the passages of `collection` most similar to `query`.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] for a blank query or `top_k == Some(0)`
    /// - [`RagError::CollectionNotFound`] if the collection does not exist
    /// - [`RagError::EmbeddingUnavailable`] if the query cannot be embedded
    /// - [`RagError::DimensionMismatch`] if the collection was built with
    ///   another embedding model
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<RetrievalResult> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidArgument("query must not be empty".into()));
        }
        let top_k = self.effective_top_k(top_k)?;

        // Missing collections fail before the embedding call is paid for.
        if self.index.collection_info(collection).await?.is_none() {
            warn!(collection, "retrieval against missing collection");
            return Err(RagError::collection_not_found(collection));
        }

        let query_vector = self.embedder.embed_one(query).await?;
        let hits = self.index.search(collection, query_vector.as_slice(), top_k).await?;
        let found = hits.len();

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|hit| self.similarity_threshold.is_none_or(|t| hit.score >= t))
            .map(RetrievedChunk::from)
            .collect();

        debug!(collection, top_k, found, kept = chunks.len(), "retrieved passages");
        Ok(RetrievalResult(chunks))
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("embedder", &self.embedder)
            .field("index", &self.index.backend())
            .field("default_top_k", &self.default_top_k)
            .field("max_top_k", &self.max_top_k)
            .field("similarity_threshold", &self.similarity_threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk { text: text.into(), score, document_id: "d".into(), chunk_index: 0 }
    }

    #[test]
    fn result_sorts_descending_and_keeps_tie_order() {
        let result = RetrievalResult::new(vec![
            chunk("low", 0.1),
            chunk("first-tie", 0.5),
            chunk("high", 0.9),
            chunk("second-tie", 0.5),
        ]);
        let texts: Vec<&str> = result.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["high", "first-tie", "second-tie", "low"]);
        assert_eq!(result.top().map(|c| c.text.as_str()), Some("high"));
    }
}
