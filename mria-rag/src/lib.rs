//! # mria-rag
//!
//! Retrieval pipeline for MRIA: users upload documents, which are chunked,
//! embedded and stored in a per-user vector collection; questions are
//! answered by a language model grounded in the most similar passages.
//!
//! ## Overview
//!
//! - [`Chunker`] splits text into bounded, overlapping passages
//! - [`Embedder`] turns passages into unit-length [`Embedding`]s through an
//!   [`EmbeddingProvider`]
//! - [`VectorIndex`] stores points per collection and runs top-k search
//! - [`Retriever`] embeds a query and searches one collection
//! - [`PromptAssembler`] builds a bounded prompt that answers only from
//!   retrieved context
//! - [`RagPipeline`] composes them into `ingest` and `answer`
//!
//! ## Features
//!
//! | Feature  | Adds |
//! |----------|------|
//! | `qdrant` | `QdrantVectorIndex` |
//! | `tei`    | `TeiEmbeddingProvider` for text-embeddings-inference servers |
//! | `openai` | `OpenAIEmbeddingProvider` |
//! | `gemini` | `GeminiGenerator` |
//! | `full`   | all of the above |
//!
//! Without features the crate still runs end to end with
//! [`InMemoryVectorIndex`] and [`HashingEmbeddingProvider`].

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod hashing;
pub mod inmemory;
pub mod pipeline;
pub mod prompt;
pub mod request;
pub mod retriever;
pub mod vectorindex;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;
#[cfg(feature = "tei")]
pub mod tei;

pub use chunking::{Chunk, Chunker, Chunks, SplitStrategy, chunk};
pub use config::{RagConfig, RagConfigBuilder, ServiceEndpoints};
pub use document::{Document, DocumentType};
pub use embedding::{Embedder, Embedding, EmbeddingProvider};
pub use error::{ErrorKind, RagError, Result};
pub use generator::Generator;
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::InMemoryVectorIndex;
pub use pipeline::{Answer, RagPipeline, RagPipelineBuilder};
pub use prompt::{AssembledPrompt, PromptAssembler};
pub use request::{IngestRequest, QueryRequest};
pub use retriever::{RetrievalResult, RetrievedChunk, Retriever};
pub use vectorindex::{
    CollectionInfo, CollectionSchema, DistanceMetric, Point, PointPayload, ScoredPoint,
    VectorIndex,
};

#[cfg(feature = "gemini")]
pub use generator::GeminiGenerator;
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorIndex;
#[cfg(feature = "tei")]
pub use tei::TeiEmbeddingProvider;
