//! Typed requests accepted by the pipeline.
//!
//! Each request is validated once, at the boundary, by `validate()`. The
//! pipeline calls it itself, so invalid requests never reach the embedder
//! or the vector index.

use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentType};
use crate::error::{RagError, Result};
use crate::vectorindex::validate_collection_name;

fn check_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(RagError::InvalidArgument("user_id must not be empty".into()));
    }
    Ok(())
}

/// Resolve the target collection: the explicit one, or the user's own.
fn resolve_collection(user_id: &str, collection: Option<&str>) -> Result<String> {
    let name = collection.unwrap_or(user_id);
    validate_collection_name(name)?;
    Ok(name.to_string())
}

/// A request to ingest one document into a user's collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestRequest {
    /// The owning user.
    pub user_id: String,
    /// Target collection; defaults to the user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// The document to ingest.
    pub document: Document,
}

impl IngestRequest {
    /// Create a request targeting the user's own collection.
    pub fn new(document: Document) -> Self {
        Self { user_id: document.user_id.clone(), collection: None, document }
    }

    /// Target an explicit collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Build a request from uploaded file bytes.
    ///
    /// Detects the document type from `file_name` and content, and decodes
    /// the bytes as UTF-8. The file name doubles as the document id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnsupportedDocumentType`] for binary formats and
    /// non-UTF-8 content.
    pub fn from_upload(
        user_id: impl Into<String>,
        collection: Option<String>,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Self> {
        let document_type = DocumentType::detect(file_name, bytes)?;
        if document_type.split_strategy().is_none() {
            return Err(RagError::UnsupportedDocumentType(format!(
                "'{file_name}' is {document_type}; only text formats can be ingested"
            )));
        }
        let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
            RagError::UnsupportedDocumentType(format!("'{file_name}' is not valid UTF-8 text"))
        })?;
        let user_id = user_id.into();
        Ok(Self {
            document: Document::new(file_name, user_id.clone(), document_type, text),
            user_id,
            collection,
        })
    }

    /// Validate the request and return the resolved collection name.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for an empty user or document
    /// id, a document owned by another user, or a malformed collection name.
    pub fn validate(&self) -> Result<String> {
        check_user_id(&self.user_id)?;
        if self.document.user_id != self.user_id {
            return Err(RagError::InvalidArgument(format!(
                "document '{}' belongs to '{}', not '{}'",
                self.document.id, self.document.user_id, self.user_id
            )));
        }
        if self.document.id.trim().is_empty() {
            return Err(RagError::InvalidArgument("document id must not be empty".into()));
        }
        resolve_collection(&self.user_id, self.collection.as_deref())
    }
}

/// A question asked against a user's collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    /// The asking user.
    pub user_id: String,
    /// Collection to search; defaults to the user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Free-text question.
    pub query: String,
    /// Number of passages to retrieve; the pipeline default when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl QueryRequest {
    /// Create a query against the user's own collection.
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), collection: None, query: query.into(), top_k: None }
    }

    /// Search an explicit collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Override the number of retrieved passages.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Validate the request and return the resolved collection name.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for an empty user id, a blank
    /// query, `top_k == Some(0)` or a malformed collection name.
    pub fn validate(&self) -> Result<String> {
        check_user_id(&self.user_id)?;
        if self.query.trim().is_empty() {
            return Err(RagError::InvalidArgument("query must not be empty".into()));
        }
        if self.top_k == Some(0) {
            return Err(RagError::InvalidArgument("top_k must be greater than zero".into()));
        }
        resolve_collection(&self.user_id, self.collection.as_deref())
    }
}
