//! Configuration for the retrieval pipeline and its external services.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::vectorindex::DistanceMetric;

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of passages retrieved when the caller does not say.
    pub default_top_k: usize,
    /// Upper bound on passages retrieved per query; larger requests are clamped.
    pub max_top_k: usize,
    /// Drop retrieved passages scoring below this value.
    pub similarity_threshold: Option<f32>,
    /// Texts per embedding provider call.
    pub embedding_batch_size: usize,
    /// Embedding inputs are truncated to this many characters.
    pub max_embedding_input_chars: usize,
    /// Character budget of an assembled prompt.
    pub max_prompt_chars: usize,
    /// Metric for newly created collections.
    pub distance_metric: DistanceMetric,
    /// Deadline for a whole `ingest` or `answer` call, in milliseconds.
    pub operation_timeout_ms: Option<u64>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 100,
            default_top_k: 5,
            max_top_k: 20,
            similarity_threshold: None,
            embedding_batch_size: 32,
            max_embedding_input_chars: 2048,
            max_prompt_chars: 12_000,
            distance_metric: DistanceMetric::Dot,
            operation_timeout_ms: None,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The operation deadline, if any.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `default_top_k == 0` or `default_top_k > max_top_k`
    /// - `embedding_batch_size`, `max_embedding_input_chars` or `max_prompt_chars` is zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.default_top_k == 0 {
            return Err(RagError::Config("default_top_k must be greater than zero".to_string()));
        }
        if self.default_top_k > self.max_top_k {
            return Err(RagError::Config(format!(
                "default_top_k ({}) must not exceed max_top_k ({})",
                self.default_top_k, self.max_top_k
            )));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Config("embedding_batch_size must be greater than zero".into()));
        }
        if self.max_embedding_input_chars == 0 {
            return Err(RagError::Config(
                "max_embedding_input_chars must be greater than zero".into(),
            ));
        }
        if self.max_prompt_chars == 0 {
            return Err(RagError::Config("max_prompt_chars must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of passages retrieved by default.
    pub fn default_top_k(mut self, k: usize) -> Self {
        self.config.default_top_k = k;
        self
    }

    /// Set the hard cap on passages retrieved per query.
    pub fn max_top_k(mut self, k: usize) -> Self {
        self.config.max_top_k = k;
        self
    }

    /// Set the minimum similarity for retrieved passages.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set how many texts are embedded per provider call.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the embedding input truncation limit in characters.
    pub fn max_embedding_input_chars(mut self, chars: usize) -> Self {
        self.config.max_embedding_input_chars = chars;
        self
    }

    /// Set the prompt budget in characters.
    pub fn max_prompt_chars(mut self, chars: usize) -> Self {
        self.config.max_prompt_chars = chars;
        self
    }

    /// Set the metric for newly created collections.
    pub fn distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.config.distance_metric = metric;
        self
    }

    /// Set a deadline for each `ingest` and `answer` call.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Locations and credentials of the external services.
///
/// Read from the process environment; binaries typically load a `.env`
/// file with `dotenvy` first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// Qdrant gRPC endpoint (`QDRANT_URL`).
    pub qdrant_url: String,
    /// Qdrant API key (`QDRANT_API_KEY`).
    pub qdrant_api_key: Option<String>,
    /// Text-embeddings-inference server (`TEI_URL`).
    pub tei_url: String,
    /// Gemini API key (`GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`).
    pub gemini_api_key: Option<String>,
    /// Gemini model name (`GEMINI_MODEL`).
    pub gemini_model: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            tei_url: "http://localhost:8080".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-1.5-pro".to_string(),
        }
    }
}

impl ServiceEndpoints {
    /// Read endpoints from the process environment, keeping defaults for unset keys.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read endpoints through an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            qdrant_url: get("QDRANT_URL").unwrap_or(defaults.qdrant_url),
            qdrant_api_key: get("QDRANT_API_KEY"),
            tei_url: get("TEI_URL").unwrap_or(defaults.tei_url),
            gemini_api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RagConfig::default().validate().is_ok());
        assert_eq!(RagConfig::default().default_top_k, 5);
    }

    #[test]
    fn builder_rejects_inconsistent_values() {
        assert!(RagConfig::builder().chunk_size(10).chunk_overlap(10).build().is_err());
        assert!(RagConfig::builder().chunk_size(0).chunk_overlap(0).build().is_err());
        assert!(RagConfig::builder().default_top_k(0).build().is_err());
        assert!(RagConfig::builder().default_top_k(30).max_top_k(20).build().is_err());
        assert!(RagConfig::builder().max_prompt_chars(0).build().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"chunk_size": 20, "chunk_overlap": 5}"#).unwrap();
        assert_eq!(config.chunk_size, 20);
        assert_eq!(config.max_top_k, RagConfig::default().max_top_k);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn endpoints_fall_back_to_google_key() {
        let env = HashMap::from([
            ("GOOGLE_API_KEY", "g-key"),
            ("QDRANT_URL", "http://qdrant:6334"),
            ("GEMINI_MODEL", " "),
        ]);
        let endpoints = ServiceEndpoints::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(endpoints.gemini_api_key.as_deref(), Some("g-key"));
        assert_eq!(endpoints.qdrant_url, "http://qdrant:6334");
        assert_eq!(endpoints.gemini_model, "gemini-1.5-pro");
        assert_eq!(endpoints.tei_url, "http://localhost:8080");
    }
}
