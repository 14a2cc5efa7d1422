//! Error types for the `mria-rag` crate.

use thiserror::Error;

use crate::vectorindex::CollectionSchema;

/// Errors that can occur in retrieval pipeline operations.
///
/// Every failure path of the pipeline maps to exactly one variant. The
/// pipeline never rewrites one kind into another on the way to the caller,
/// so matching on [`RagError::kind`] is enough to pick a retry policy.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad caller input: chunk sizes, `top_k`, empty queries, malformed names.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The named collection does not exist in the vector index.
    #[error("Collection '{collection}' not found")]
    CollectionNotFound {
        /// The collection that was addressed.
        collection: String,
    },

    /// A collection already exists with a different dimension or metric.
    #[error("Collection '{collection}' exists as {existing}, requested {requested}")]
    DimensionConflict {
        /// The collection that was addressed.
        collection: String,
        /// The schema the collection was created with.
        existing: CollectionSchema,
        /// The schema the caller asked for.
        requested: CollectionSchema,
    },

    /// A vector's length does not match the collection dimension.
    #[error("Dimension mismatch in '{collection}': expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The collection that was addressed.
        collection: String,
        /// The collection dimension.
        expected: usize,
        /// The offending vector length.
        actual: usize,
    },

    /// The embedding model or service could not produce vectors.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generative model could not produce an answer.
    #[error("Generation unavailable ({provider}): {message}")]
    GenerationUnavailable {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector index backend is unreachable or failed unexpectedly.
    #[error("Vector index unavailable ({backend}): {message}")]
    VectorIndexUnavailable {
        /// The vector index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The detected document type cannot be chunked.
    #[error("Unsupported document type: {0}")]
    UnsupportedDocumentType(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation did not finish before its deadline.
    #[error("{operation} timed out after {elapsed_ms} ms")]
    Timeout {
        /// The pipeline operation that was cancelled.
        operation: &'static str,
        /// The configured deadline in milliseconds.
        elapsed_ms: u64,
    },
}

/// Fieldless discriminant of [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`RagError::InvalidArgument`].
    InvalidArgument,
    /// See [`RagError::CollectionNotFound`].
    CollectionNotFound,
    /// See [`RagError::DimensionConflict`].
    DimensionConflict,
    /// See [`RagError::DimensionMismatch`].
    DimensionMismatch,
    /// See [`RagError::EmbeddingUnavailable`].
    EmbeddingUnavailable,
    /// See [`RagError::GenerationUnavailable`].
    GenerationUnavailable,
    /// See [`RagError::VectorIndexUnavailable`].
    VectorIndexUnavailable,
    /// See [`RagError::UnsupportedDocumentType`].
    UnsupportedDocumentType,
    /// See [`RagError::Config`].
    Config,
    /// See [`RagError::Timeout`].
    Timeout,
}

impl RagError {
    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::CollectionNotFound { .. } => ErrorKind::CollectionNotFound,
            Self::DimensionConflict { .. } => ErrorKind::DimensionConflict,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::EmbeddingUnavailable { .. } => ErrorKind::EmbeddingUnavailable,
            Self::GenerationUnavailable { .. } => ErrorKind::GenerationUnavailable,
            Self::VectorIndexUnavailable { .. } => ErrorKind::VectorIndexUnavailable,
            Self::UnsupportedDocumentType(_) => ErrorKind::UnsupportedDocumentType,
            Self::Config(_) => ErrorKind::Config,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub(crate) fn collection_not_found(collection: &str) -> Self {
        Self::CollectionNotFound { collection: collection.to_string() }
    }
}

/// A convenience result type for retrieval pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let cases = [
            (RagError::InvalidArgument("x".into()), ErrorKind::InvalidArgument),
            (RagError::collection_not_found("user1"), ErrorKind::CollectionNotFound),
            (RagError::Config("bad".into()), ErrorKind::Config),
            (RagError::Timeout { operation: "answer", elapsed_ms: 5 }, ErrorKind::Timeout),
        ];
        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }
}
