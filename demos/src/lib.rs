//! Shared fixtures for the MRIA demos: sample uploads and an offline generator.

use async_trait::async_trait;
use mria_rag::{Generator, IngestRequest, Result};

/// Files a demo user uploads: `(file name, contents)`.
pub const SAMPLE_UPLOADS: &[(&str, &str)] = &[
    ("mat.txt", "A cat sat on a mat. The mat was red."),
    (
        "rust.md",
        "# Rust\n\nRust is a systems programming language focused on safety, speed and \
         concurrency.\n\nIt achieves memory safety without a garbage collector through its \
         ownership system.",
    ),
    (
        "rag.html",
        "<p>Retrieval-augmented generation combines a retriever with a language model. \
         Documents are chunked, embedded and stored in a vector database. At query time the \
         most relevant chunks are retrieved and given to the model as context.</p>",
    ),
];

/// Build ingest requests for every sample upload owned by `user_id`.
pub fn sample_requests(user_id: &str) -> Result<Vec<IngestRequest>> {
    SAMPLE_UPLOADS
        .iter()
        .map(|(name, body)| IngestRequest::from_upload(user_id, None, name, body.as_bytes()))
        .collect()
}

/// A generator that needs no model: it answers with the best context
/// passage, or admits it has none.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    fn first_context(prompt: &str) -> Option<&str> {
        let start = prompt.find("<<<context 1 ")?;
        let body = &prompt[start..];
        let body = &body[body.find('\n')? + 1..];
        let end = body.find("\n<<<end context 1>>>")?;
        Some(body[..end].trim())
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(match Self::first_context(prompt) {
            Some(passage) => format!("From your documents: \"{passage}\""),
            None => "Your documents do not cover this question.".to_string(),
        })
    }

    fn name(&self) -> &str {
        "extractive"
    }
}
