//! Embedding provider for a HuggingFace text-embeddings-inference server.
//!
//! This module is only available when the `tei` feature is enabled. The
//! default dimensions match `BAAI/bge-large-en-v1.5`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::ServiceEndpoints;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "tei";

/// Output size of `BAAI/bge-large-en-v1.5`.
pub const DEFAULT_DIMENSIONS: usize = 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An [`EmbeddingProvider`] calling `POST {url}/embed` on a
/// text-embeddings-inference server.
///
/// The server is asked to truncate over-long inputs itself, so a request
/// never fails for length. Pooling and normalisation follow the server's
/// model configuration (CLS pooling for the BGE family).
///
/// # Example
///
/// ```rust,ignore
/// use mria_rag::tei::TeiEmbeddingProvider;
///
/// let provider = TeiEmbeddingProvider::new("http://localhost:8080")?;
/// let vectors = provider.embed_batch(&["hello world"]).await?;
/// ```
#[derive(Debug)]
pub struct TeiEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    dimensions: usize,
}

impl TeiEmbeddingProvider {
    /// Create a provider for the server at `base_url`.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = base_url.as_ref().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(RagError::Config("TEI base URL must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build TEI HTTP client: {e}")))?;
        Ok(Self { client, url: format!("{base_url}/embed"), dimensions: DEFAULT_DIMENSIONS })
    }

    /// Create a provider from `TEI_URL`.
    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Result<Self> {
        Self::new(&endpoints.tei_url)
    }

    /// Declare the served model's output size.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn unavailable(message: String) -> RagError {
        RagError::EmbeddingUnavailable { provider: PROVIDER.into(), message }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [&'a str],
    truncate: bool,
    normalize: bool,
}

#[async_trait]
impl EmbeddingProvider for TeiEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let body = EmbedRequest { inputs: texts, truncate: true, normalize: true };
        let response = self.client.post(&self.url).json(&body).send().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "request failed");
            Self::unavailable(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(provider = PROVIDER, %status, "server error");
            return Err(Self::unavailable(format!("server returned {status}: {detail}")));
        }

        response.json::<Vec<Vec<f32>>>().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::unavailable(format!("failed to parse response: {e}"))
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
