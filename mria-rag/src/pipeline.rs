//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] composes an [`Embedder`], a [`VectorIndex`] and a
//! [`Generator`] into the two user-facing operations:
//!
//! - **ingest**: chunk → embed → upsert into the user's collection
//! - **answer**: retrieve → assemble prompt → generate
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mria_rag::{
//!     HashingEmbeddingProvider, InMemoryVectorIndex, IngestRequest, QueryRequest, RagConfig,
//!     RagPipeline,
//! };
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(1024)))
//!     .vector_index(Arc::new(InMemoryVectorIndex::new()))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! let request = IngestRequest::from_upload("user1", None, "notes.txt", bytes)?;
//! pipeline.ingest(&request).await?;
//! let answer = pipeline.answer(&QueryRequest::new("user1", "What color was the mat?")).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunk, Chunker};
use crate::config::RagConfig;
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generator::Generator;
use crate::prompt::PromptAssembler;
use crate::request::{IngestRequest, QueryRequest};
use crate::retriever::{RetrievalResult, RetrievedChunk, Retriever};
use crate::vectorindex::{
    CollectionInfo, CollectionSchema, Point, VectorIndex, validate_collection_name,
};

/// A generated answer and the passages it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// The generator's response.
    pub text: String,
    /// Context passages included in the prompt, most similar first. Empty
    /// when nothing relevant was found.
    pub sources: Vec<RetrievedChunk>,
}

impl Answer {
    /// Whether the answer was generated with any retrieved context.
    pub fn is_grounded(&self) -> bool {
        !self.sources.is_empty()
    }
}

/// The RAG pipeline orchestrator.
///
/// Holds explicitly constructed handles to its collaborators; share it
/// between tasks behind an `Arc`. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedder: Arc<Embedder>,
    vector_index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    retriever: Retriever,
    prompt_assembler: PromptAssembler,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedder.
    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    /// Return a reference to the vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector_index
    }

    /// Return a reference to the retriever.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Schema of collections created by this pipeline.
    pub fn collection_schema(&self) -> CollectionSchema {
        CollectionSchema::new(self.embedder.dimensions(), self.config.distance_metric)
    }

    /// Create a collection sized for the configured embedder.
    ///
    /// Idempotent for an identical schema.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for a malformed name and
    /// [`RagError::DimensionConflict`] if the collection exists with
    /// another schema.
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        self.vector_index.create_collection(name, self.collection_schema()).await.inspect_err(
            |e| error!(collection = name, error = %e, "failed to create collection"),
        )
    }

    /// Delete a collection and every point in it.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        self.vector_index.delete_collection(name).await.inspect_err(|e| {
            error!(collection = name, error = %e, "failed to delete collection");
        })?;
        info!(collection = name, "deleted collection");
        Ok(())
    }

    /// Return schema and size of a collection, or `None` if it does not exist.
    pub async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        validate_collection_name(name)?;
        self.vector_index.collection_info(name).await
    }

    /// Remove every chunk of `document_id` from `collection`.
    pub async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        validate_collection_name(collection)?;
        self.vector_index.delete_document(collection, document_id, 0).await?;
        info!(collection, document.id = document_id, "deleted document");
        Ok(())
    }

    /// Ingest a single document: chunk → embed → store.
    ///
    /// Creates the target collection on first use. Returns the number of
    /// points stored. Re-ingesting a document overwrites its chunks in place
    /// and removes chunks a shorter revision no longer has.
    ///
    /// # Errors
    ///
    /// Any stage's error is returned unchanged. The collection is only
    /// created once the chunks are embedded, and a collection this call
    /// created is removed again if the upsert fails and leaves it empty, so a
    /// failed first ingest never provisions a collection. When the upsert
    /// fails, every point of the document is deleted before returning, so the
    /// document is either fully ingested or absent; if that delete fails too,
    /// re-ingesting the same document repairs it.
    ///
    /// Stale chunks of a longer earlier revision are pruned after the upsert.
    /// If that prune fails, or the deadline fires between upsert and prune,
    /// the new chunks stay queryable next to the old revision's tail until
    /// the document is ingested again or deleted with
    /// [`delete_document`](Self::delete_document).
    #[tracing::instrument(
        skip_all,
        fields(user_id = %request.user_id, document.id = %request.document.id)
    )]
    pub async fn ingest(&self, request: &IngestRequest) -> Result<usize> {
        self.with_deadline("ingest", self.ingest_document(request)).await
    }

    /// Ingest several documents in order, stopping at the first failure.
    ///
    /// Returns the total number of points stored.
    pub async fn ingest_batch(&self, requests: &[IngestRequest]) -> Result<usize> {
        let mut total = 0;
        for request in requests {
            total += self.ingest(request).await?;
        }
        Ok(total)
    }

    /// Retrieve the passages most relevant to a query without generating.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CollectionNotFound`] if the collection has never
    /// been created; an empty result means it was searched and nothing matched.
    #[tracing::instrument(skip_all, fields(user_id = %request.user_id))]
    pub async fn retrieve(&self, request: &QueryRequest) -> Result<RetrievalResult> {
        self.with_deadline("retrieve", async {
            let collection = request.validate()?;
            self.retriever.retrieve(&collection, &request.query, request.top_k).await
        })
        .await
    }

    /// Answer a question from the user's documents: retrieve → assemble → generate.
    ///
    /// # Errors
    ///
    /// - [`RagError::CollectionNotFound`] if the user has never ingested
    ///   anything; no ungrounded answer is generated
    /// - [`RagError::GenerationUnavailable`] if the generator fails
    /// - any retrieval error, unchanged
    #[tracing::instrument(skip_all, fields(user_id = %request.user_id))]
    pub async fn answer(&self, request: &QueryRequest) -> Result<Answer> {
        self.with_deadline("answer", self.answer_query(request)).await
    }

    async fn ingest_document(&self, request: &IngestRequest) -> Result<usize> {
        let collection = request.validate()?;
        let document = &request.document;
        let strategy = document.document_type.split_strategy().ok_or_else(|| {
            RagError::UnsupportedDocumentType(format!(
                "document '{}' is {} and cannot be chunked",
                document.id, document.document_type
            ))
        })?;
        let chunker = Chunker::new(self.config.chunk_size, self.config.chunk_overlap, strategy)?;

        // 1. Chunk the document
        let chunks: Vec<Chunk<'_>> = chunker.chunks(&document.text).collect();
        debug!(chunk_count = chunks.len(), ?strategy, "chunked document");

        // 2. Embed all chunks, in chunk order
        let texts: Vec<&str> = chunks.iter().map(|c| c.text).collect();
        let embeddings = self.embedder.embed(&texts).await.inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
        })?;

        // 3. Pair each vector with its chunk
        let points: Vec<Point> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                Point::from_chunk(&document.id, chunk.index, chunk.text, embedding)
            })
            .collect();

        // 4. Provision the collection, then upsert, rolling back on failure
        let provisioned = self.vector_index.collection_info(&collection).await?.is_none();
        self.vector_index.create_collection(&collection, self.collection_schema()).await?;
        if !points.is_empty() {
            if let Err(e) = self.vector_index.upsert(&collection, &points).await {
                error!(document.id = %document.id, error = %e, "upsert failed during ingestion");
                self.roll_back(&collection, &document.id, provisioned).await;
                return Err(e);
            }
        }

        // 5. Drop chunks left over from a longer earlier revision
        let chunk_count = points.len();
        self.vector_index.delete_document(&collection, &document.id, chunk_count).await.inspect_err(
            |e| warn!(document.id = %document.id, error = %e, "failed to prune stale chunks"),
        )?;

        info!(collection = %collection, document.id = %document.id, chunk_count, "ingested document");
        Ok(chunk_count)
    }

    /// Remove every point of a document whose ingest failed, so no mix of
    /// old and new chunks stays queryable. A collection provisioned by the
    /// failed call is dropped if nothing else was written to it meanwhile.
    async fn roll_back(&self, collection: &str, document_id: &str, provisioned: bool) {
        if let Err(e) = self.vector_index.delete_document(collection, document_id, 0).await {
            error!(collection, error = %e, "rollback after failed upsert also failed");
            return;
        }
        warn!(collection, document.id = document_id, "rolled back failed ingest");

        if !provisioned {
            return;
        }
        match self.vector_index.collection_info(collection).await {
            Ok(Some(info)) if info.points_count == 0 => {
                if let Err(e) = self.vector_index.delete_collection(collection).await {
                    error!(collection, error = %e, "failed to drop collection of failed ingest");
                } else {
                    warn!(collection, "dropped collection provisioned by failed ingest");
                }
            }
            Ok(_) => {}
            Err(e) => error!(collection, error = %e, "failed to inspect collection after rollback"),
        }
    }

    async fn answer_query(&self, request: &QueryRequest) -> Result<Answer> {
        let collection = request.validate()?;

        let retrieved = self.retriever.retrieve(&collection, &request.query, request.top_k).await?;
        let prompt = self.prompt_assembler.assemble(&retrieved, &request.query)?;
        debug!(included = prompt.included, dropped = prompt.dropped, "assembled prompt");

        let text = self.generator.generate(&prompt.text).await.inspect_err(|e| {
            error!(generator = self.generator.name(), error = %e, "generation failed");
        })?;

        let sources: Vec<RetrievedChunk> = retrieved.into_iter().take(prompt.included).collect();
        info!(collection = %collection, source_count = sources.len(), "answered query");
        Ok(Answer { text, sources })
    }

    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let Some(limit) = self.config.operation_timeout() else {
            return work.await;
        };
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = limit.as_millis() as u64, "operation timed out");
                Err(RagError::Timeout { operation, elapsed_ms: limit.as_millis() as u64 })
            }
        }
    }
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("embedder", &self.embedder)
            .field("vector_index", &self.vector_index.backend())
            .field("generator", &self.generator.name())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// An embedder (or a raw embedding provider), a vector index and a
/// generator are required. The config defaults to [`RagConfig::default`]
/// and the prompt assembler to one sized by `max_prompt_chars`.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(config)
///     .embedding_provider(Arc::new(provider))
///     .vector_index(Arc::new(index))
///     .generator(Arc::new(generator))
///     .prompt_assembler(PromptAssembler::new(8_000).with_instruction("Be brief."))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedder: Option<Arc<Embedder>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    generator: Option<Arc<dyn Generator>>,
    prompt_assembler: Option<PromptAssembler>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a fully configured embedder.
    pub fn embedder(mut self, embedder: Arc<Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use a raw provider, wrapped with the config's batch size and
    /// truncation limit. Ignored if [`embedder`](Self::embedder) is set.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector index backend.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Override the prompt assembler.
    pub fn prompt_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.prompt_assembler = Some(assembler);
        self
    }

    /// Build the [`RagPipeline`], validating the config and required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or the
    /// config is inconsistent.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedder = match (self.embedder, self.embedding_provider) {
            (Some(embedder), _) => embedder,
            (None, Some(provider)) => Arc::new(
                Embedder::new(provider)
                    .with_batch_size(config.embedding_batch_size)
                    .with_max_input_chars(config.max_embedding_input_chars),
            ),
            (None, None) => {
                return Err(RagError::Config("embedder or embedding_provider is required".into()));
            }
        };
        if embedder.dimensions() == 0 {
            return Err(RagError::Config("embedder reports zero dimensions".into()));
        }
        let vector_index = self
            .vector_index
            .ok_or_else(|| RagError::Config("vector_index is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;

        let retriever = Retriever::new(embedder.clone(), vector_index.clone())
            .with_top_k_bounds(config.default_top_k, config.max_top_k)?
            .with_similarity_threshold(config.similarity_threshold);
        let prompt_assembler = self
            .prompt_assembler
            .unwrap_or_else(|| PromptAssembler::new(config.max_prompt_chars));

        Ok(RagPipeline {
            config,
            embedder,
            vector_index,
            generator,
            retriever,
            prompt_assembler,
        })
    }
}
