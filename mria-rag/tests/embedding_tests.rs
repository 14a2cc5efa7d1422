//! Tests for the embedding contract enforced by `Embedder`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mria_rag::embedding::{Embedder, EmbeddingProvider, NORM_TOLERANCE, l2_norm};
use mria_rag::{HashingEmbeddingProvider, RagError, Result};
use proptest::prelude::*;

/// Records batch sizes and the texts it was given; returns `[len, index]`.
#[derive(Default)]
struct RecordingProvider {
    calls: AtomicUsize,
    longest_input: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for RecordingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for text in texts {
            self.longest_input.fetch_max(text.chars().count(), Ordering::SeqCst);
        }
        Ok(texts.iter().map(|t| vec![t.chars().count() as f32 + 1.0, 1.0]).collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Misbehaves in a configurable way.
enum Faulty {
    Down,
    WrongCount,
    WrongDimension,
    Zero,
}

#[async_trait]
impl EmbeddingProvider for Faulty {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Down => Err(RagError::EmbeddingUnavailable {
                provider: "faulty".into(),
                message: "connection refused".into(),
            }),
            Self::WrongCount => Ok(vec![vec![1.0, 0.0]]),
            Self::WrongDimension => Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect()),
            Self::Zero => Ok(texts.iter().map(|_| vec![0.0, 0.0]).collect()),
        }
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "faulty"
    }
}

/// *For any* texts, every embedding returned by the hashing provider
/// through the `Embedder` SHALL have unit L2 norm.
mod prop_unit_norm {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn embeddings_have_unit_norm(texts in proptest::collection::vec(".{0,200}", 1..12)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let embedder = Embedder::new(Arc::new(HashingEmbeddingProvider::new(64)))
                .with_batch_size(5);
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

            let embeddings = rt.block_on(embedder.embed(&refs)).unwrap();

            prop_assert_eq!(embeddings.len(), texts.len());
            for e in &embeddings {
                prop_assert_eq!(e.dimension(), 64);
                prop_assert!((l2_norm(e.as_slice()) - 1.0).abs() < NORM_TOLERANCE);
            }
        }
    }
}

#[tokio::test]
async fn output_order_matches_input_across_batches() {
    let provider = Arc::new(RecordingProvider::default());
    let embedder = Embedder::new(provider.clone()).with_batch_size(2);
    let texts = ["a", "bbb", "cc", "dddddd", "e"];

    let embeddings = embedder.embed(&texts).await.unwrap();

    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    // Longer inputs lean further towards the first axis.
    let leans: Vec<f32> = embeddings.iter().map(|e| e.as_slice()[0]).collect();
    let expected: Vec<f32> = texts
        .iter()
        .map(|t| {
            let x = t.len() as f32 + 1.0;
            x / (x * x + 1.0).sqrt()
        })
        .collect();
    for (got, want) in leans.iter().zip(&expected) {
        assert!((got - want).abs() < 1e-5, "{got} != {want}");
    }
}

#[tokio::test]
async fn long_inputs_are_truncated_not_rejected() {
    let provider = Arc::new(RecordingProvider::default());
    let embedder = Embedder::new(provider.clone()).with_max_input_chars(10);

    let long = "ü".repeat(50);
    let embedding = embedder.embed_one(&long).await.unwrap();

    assert_eq!(provider.longest_input.load(Ordering::SeqCst), 10);
    assert_eq!(embedding.dimension(), 2);
}

#[tokio::test]
async fn empty_input_makes_no_calls() {
    let provider = Arc::new(RecordingProvider::default());
    let embedder = Embedder::new(provider.clone());
    assert!(embedder.embed(&[]).await.unwrap().is_empty());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provider_faults_are_embedding_unavailable() {
    for faulty in [Faulty::Down, Faulty::WrongCount, Faulty::WrongDimension, Faulty::Zero] {
        let embedder = Embedder::new(Arc::new(faulty));
        let err = embedder.embed(&["one", "two"]).await.unwrap_err();
        assert!(
            matches!(err, RagError::EmbeddingUnavailable { .. }),
            "unexpected error: {err}"
        );
    }
}
