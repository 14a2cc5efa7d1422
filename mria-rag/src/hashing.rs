//! Deterministic, offline embedding provider.
//!
//! [`HashingEmbeddingProvider`] uses the hashing trick: every lower-cased
//! alphanumeric token is hashed (FNV-1a) into one of `dimensions` buckets and
//! counted. Texts that share vocabulary end up close under cosine
//! similarity, which is enough for development, demos and tests without a
//! model server. It has no notion of synonyms or word order.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// A bag-of-words [`EmbeddingProvider`] built on feature hashing.
///
/// # Example
///
/// ```rust,ignore
/// use mria_rag::HashingEmbeddingProvider;
///
/// let provider = HashingEmbeddingProvider::new(1024);
/// let vectors = provider.embed_batch(&["the mat was red"]).await?;
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing `dimensions`-long vectors (minimum 1).
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    /// Embed one text into raw token counts.
    ///
    /// Text without alphanumeric tokens is hashed whole so the result is
    /// never the zero vector.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut seen_token = false;
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let token = token.to_lowercase();
            vector[self.bucket(token.as_bytes())] += 1.0;
            seen_token = true;
        }
        if !seen_token {
            vector[self.bucket(text.trim().as_bytes())] += 1.0;
        }
        vector
    }

    fn bucket(&self, bytes: &[u8]) -> usize {
        (fnv1a(bytes) % self.dimensions as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::dot;

    #[test]
    fn vectorize_is_deterministic_and_case_insensitive() {
        let provider = HashingEmbeddingProvider::new(256);
        assert_eq!(provider.vectorize("The Mat"), provider.vectorize("the mat"));
    }

    #[test]
    fn punctuation_only_text_is_not_zero() {
        let provider = HashingEmbeddingProvider::new(32);
        assert!(provider.vectorize("!!!").iter().any(|x| *x > 0.0));
        assert!(provider.vectorize("").iter().any(|x| *x > 0.0));
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let provider = HashingEmbeddingProvider::new(1024);
        let query = provider.vectorize("what color was the mat");
        let close = provider.vectorize("mat. The mat was red");
        let far = provider.vectorize("quantum chromodynamics lecture");
        assert!(dot(&query, &close) > dot(&query, &far));
    }
}
