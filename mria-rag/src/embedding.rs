//! Embedding providers and the contract-enforcing [`Embedder`].
//!
//! An [`EmbeddingProvider`] wraps one backend (a local model, an HTTP
//! inference server, a hosted API) and returns raw vectors. The
//! [`Embedder`] sits in front of a provider and guarantees what the rest of
//! the pipeline relies on:
//!
//! - output order matches input order, one vector per input
//! - every vector has the provider's dimension
//! - every vector is L2-normalised, so dot product equals cosine similarity
//! - inputs longer than the model limit are truncated, not rejected
//!
//! Provider failures surface as [`RagError::EmbeddingUnavailable`] and are
//! never retried here; the caller owns retry policy.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::{RagError, Result};

/// Tolerance used when checking that a vector has unit length.
pub const NORM_TOLERANCE: f32 = 1e-4;

/// A fixed-dimension, L2-normalised embedding vector.
///
/// The only way to build one is [`Embedding::normalize`], so holding an
/// `Embedding` means holding a unit vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Normalise `values` to unit length.
    ///
    /// Returns `None` for empty, zero-magnitude or non-finite input.
    pub fn normalize(mut values: Vec<f32>) -> Option<Self> {
        let norm = l2_norm(&values);
        if values.is_empty() || !norm.is_finite() || norm == 0.0 {
            return None;
        }
        values.iter_mut().for_each(|x| *x /= norm);
        Some(Self(values))
    }

    /// Return the vector components.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Return the number of components.
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Dot product with another vector; equals cosine similarity for two embeddings.
    pub fn dot(&self, other: &[f32]) -> f32 {
        dot(&self.0, other)
    }

    /// Consume the embedding and return its components.
    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Dot product of two vectors, truncated to the shorter length.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Truncate `text` to at most `max_chars` characters.
///
/// Truncation is deterministic and lossy: everything after the limit is
/// dropped, and the cut always lands on a character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// A provider that generates raw vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. They need not normalise their output; [`Embedder`] does.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short name used in logs and error messages.
    fn name(&self) -> &str;
}

/// Enforces the embedding contract on top of an [`EmbeddingProvider`].
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use mria_rag::{Embedder, HashingEmbeddingProvider};
///
/// let embedder = Embedder::new(Arc::new(HashingEmbeddingProvider::new(64)));
/// let v = embedder.embed_one("hello world").await?;
/// assert_eq!(v.dimension(), 64);
/// ```
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_input_chars: usize,
}

impl Embedder {
    /// Default number of texts sent to the provider per call.
    pub const DEFAULT_BATCH_SIZE: usize = 32;
    /// Default per-input character limit before truncation.
    pub const DEFAULT_MAX_INPUT_CHARS: usize = 2048;

    /// Wrap a provider with default batching and truncation limits.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            max_input_chars: Self::DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Set how many texts are sent to the provider per call (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the per-input character limit (minimum 1).
    ///
    /// Longer inputs are truncated before embedding. Callers that need the
    /// full text represented must chunk within this limit.
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.max(1);
        self
    }

    /// Return the dimensionality of produced embeddings.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Return the provider name.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed a sequence of texts.
    ///
    /// The `i`-th output belongs to the `i`-th input. Inputs are sent in
    /// batches of the configured size.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingUnavailable`] if the provider fails,
    /// returns the wrong number of vectors, a vector of the wrong dimension,
    /// or a vector that cannot be normalised.
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let inputs: Vec<&str> = batch.iter().map(|t| self.truncate(t)).collect();

            debug!(provider = self.provider.name(), batch_size = inputs.len(), "embedding batch");
            let raw = self.provider.embed_batch(&inputs).await.inspect_err(|e| {
                error!(provider = self.provider.name(), error = %e, "embedding request failed");
            })?;

            if raw.len() != inputs.len() {
                return Err(self.fault(format!(
                    "expected {} vectors, provider returned {}",
                    inputs.len(),
                    raw.len()
                )));
            }
            for vector in raw {
                embeddings.push(self.validate(vector)?);
            }
        }
        Ok(embeddings)
    }

    /// Embed a single text, typically a query.
    pub async fn embed_one(&self, text: &str) -> Result<Embedding> {
        self.embed(&[text])
            .await?
            .pop()
            .ok_or_else(|| self.fault("provider returned no vector".into()))
    }

    fn truncate<'t>(&self, text: &'t str) -> &'t str {
        let truncated = truncate_chars(text, self.max_input_chars);
        if truncated.len() < text.len() {
            debug!(
                provider = self.provider.name(),
                max_chars = self.max_input_chars,
                dropped_bytes = text.len() - truncated.len(),
                "truncated embedding input"
            );
        }
        truncated
    }

    fn validate(&self, vector: Vec<f32>) -> Result<Embedding> {
        let expected = self.provider.dimensions();
        if vector.len() != expected {
            return Err(self.fault(format!(
                "expected {expected}-dimensional vector, got {}",
                vector.len()
            )));
        }
        Embedding::normalize(vector)
            .ok_or_else(|| self.fault("provider returned a zero or non-finite vector".into()))
    }

    fn fault(&self, message: String) -> RagError {
        RagError::EmbeddingUnavailable { provider: self.provider.name().to_string(), message }
    }
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.provider.name())
            .field("dimensions", &self.provider.dimensions())
            .field("batch_size", &self.batch_size)
            .field("max_input_chars", &self.max_input_chars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let e = Embedding::normalize(vec![3.0, 4.0]).unwrap();
        assert!((l2_norm(e.as_slice()) - 1.0).abs() < NORM_TOLERANCE);
        assert_eq!(e.as_slice(), &[0.6, 0.8]);
    }

    #[test]
    fn normalize_rejects_degenerate_vectors() {
        assert!(Embedding::normalize(vec![]).is_none());
        assert!(Embedding::normalize(vec![0.0, 0.0]).is_none());
        assert!(Embedding::normalize(vec![f32::NAN, 1.0]).is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
