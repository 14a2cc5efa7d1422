//! Property and scenario tests for the in-memory vector index.

use std::collections::HashMap;

use mria_rag::embedding::Embedding;
use mria_rag::inmemory::InMemoryVectorIndex;
use mria_rag::vectorindex::{CollectionSchema, DistanceMetric, Point, VectorIndex};
use mria_rag::{ErrorKind, RagError};
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim)
        .prop_filter_map("non-zero embedding", |v| Embedding::normalize(v).map(Embedding::into_vec))
}

/// Generate a point with a normalized embedding.
fn arb_point(dim: usize) -> impl Strategy<Value = Point> {
    ("[a-z]{3,8}", 0usize..4, "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(document_id, chunk_index, text, vector)| {
            let embedding = Embedding::normalize(vector).unwrap();
            Point::from_chunk(&document_id, chunk_index, text, embedding)
        },
    )
}

fn schema(dimension: usize) -> CollectionSchema {
    CollectionSchema::new(dimension, DistanceMetric::Dot)
}

fn unit_point(document_id: &str, chunk_index: usize, vector: Vec<f32>) -> Point {
    let embedding = Embedding::normalize(vector).unwrap();
    Point::from_chunk(document_id, chunk_index, format!("{document_id}#{chunk_index}"), embedding)
}

/// *For any* set of points stored in an InMemoryVectorIndex, searching SHALL
/// return results ordered by non-increasing score, at most `top_k` of them
/// and at most as many as are stored.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            points in proptest::collection::vec(arb_point(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
            metric in prop_oneof![Just(DistanceMetric::Dot), Just(DistanceMetric::Cosine)],
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let unique_count = points.iter().map(|p| &p.id).collect::<std::collections::HashSet<_>>().len();

            let results = rt.block_on(async {
                let index = InMemoryVectorIndex::new();
                index.create_collection("test", CollectionSchema::new(DIM, metric)).await.unwrap();
                index.upsert("test", &points).await.unwrap();
                index.search("test", &query, top_k).await.unwrap()
            });

            prop_assert!(results.len() <= top_k);
            prop_assert!(results.len() <= unique_count);
            prop_assert_eq!(results.len(), top_k.min(unique_count));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }
    }
}

/// *For any* points, upserting them twice SHALL yield the same search
/// results as upserting them once.
mod prop_upsert_idempotence {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn double_upsert_matches_single(
            points in proptest::collection::vec(arb_point(DIM), 1..12),
            query in arb_normalized_embedding(DIM),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (once, twice) = rt.block_on(async {
                let single = InMemoryVectorIndex::new();
                single.create_collection("c", schema(DIM)).await.unwrap();
                single.upsert("c", &points).await.unwrap();

                let double = InMemoryVectorIndex::new();
                double.create_collection("c", schema(DIM)).await.unwrap();
                double.upsert("c", &points).await.unwrap();
                double.upsert("c", &points).await.unwrap();

                (
                    single.search("c", &query, 50).await.unwrap(),
                    double.search("c", &query, 50).await.unwrap(),
                )
            });
            prop_assert_eq!(once, twice);
        }
    }
}

#[tokio::test]
async fn create_collection_is_idempotent_and_detects_conflicts() {
    let index = InMemoryVectorIndex::new();
    index.create_collection("user1", schema(1024)).await.unwrap();
    index.upsert("user1", &[unit_point("doc", 0, vec![1.0; 1024])]).await.unwrap();

    // Same schema again: no-op, data kept.
    index.create_collection("user1", schema(1024)).await.unwrap();
    let info = index.collection_info("user1").await.unwrap().unwrap();
    assert_eq!(info.points_count, 1);

    let err = index.create_collection("user1", schema(512)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionConflict);
    let err = index
        .create_collection("user1", CollectionSchema::new(1024, DistanceMetric::Cosine))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionConflict);
}

#[tokio::test]
async fn upsert_with_wrong_dimension_fails_and_writes_nothing() {
    let index = InMemoryVectorIndex::new();
    index.create_collection("user1", schema(1024)).await.unwrap();

    let good = unit_point("doc", 0, vec![1.0; 1024]);
    let bad = unit_point("doc", 1, vec![1.0; 512]);
    let err = index.upsert("user1", &[good, bad]).await.unwrap_err();

    assert!(matches!(
        err,
        RagError::DimensionMismatch { expected: 1024, actual: 512, .. }
    ));
    let info = index.collection_info("user1").await.unwrap().unwrap();
    assert_eq!(info.points_count, 0);
}

#[tokio::test]
async fn operations_on_missing_collection_fail() {
    let index = InMemoryVectorIndex::new();
    let point = unit_point("doc", 0, vec![1.0, 0.0]);

    let err = index.upsert("nobody", &[point]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CollectionNotFound);
    let err = index.search("nobody", &[1.0, 0.0], 3).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CollectionNotFound);
    assert!(index.collection_info("nobody").await.unwrap().is_none());
    // Deleting what is not there is fine.
    index.delete_collection("nobody").await.unwrap();
}

#[tokio::test]
async fn search_rejects_zero_top_k_and_wrong_query_dimension() {
    let index = InMemoryVectorIndex::new();
    index.create_collection("c", schema(2)).await.unwrap();

    let err = index.search("c", &[1.0, 0.0], 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = index.search("c", &[1.0, 0.0, 0.0], 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[tokio::test]
async fn ties_keep_first_insertion_order_even_after_replace() {
    let index = InMemoryVectorIndex::new();
    index.create_collection("c", schema(2)).await.unwrap();

    let same = vec![1.0, 1.0];
    index.upsert("c", &[unit_point("a", 0, same.clone())]).await.unwrap();
    index.upsert("c", &[unit_point("b", 0, same.clone())]).await.unwrap();
    index.upsert("c", &[unit_point("c", 0, same.clone())]).await.unwrap();
    // Replacing "a" keeps its original position.
    index.upsert("c", &[unit_point("a", 0, same)]).await.unwrap();

    let hits = index.search("c", &[1.0, 0.0], 3).await.unwrap();
    let order: Vec<&str> = hits.iter().map(|h| h.payload.document_id.as_str()).collect();
    assert_eq!(order, ["a", "b", "c"]);
}

#[tokio::test]
async fn delete_document_removes_only_requested_chunks() {
    let index = InMemoryVectorIndex::new();
    index.create_collection("c", schema(2)).await.unwrap();
    let points: Vec<Point> = (0..4)
        .map(|i| unit_point("doc", i, vec![1.0, i as f32]))
        .chain([unit_point("other", 0, vec![0.0, 1.0])])
        .collect();
    index.upsert("c", &points).await.unwrap();

    index.delete_document("c", "doc", 2).await.unwrap();

    let hits = index.search("c", &[1.0, 0.0], 10).await.unwrap();
    let mut remaining: HashMap<String, Vec<usize>> = HashMap::new();
    for hit in hits {
        remaining.entry(hit.payload.document_id).or_default().push(hit.payload.chunk_index);
    }
    let mut doc = remaining.remove("doc").unwrap();
    doc.sort_unstable();
    assert_eq!(doc, [0, 1]);
    assert_eq!(remaining.remove("other"), Some(vec![0]));
}

#[tokio::test]
async fn collections_are_isolated() {
    let index = InMemoryVectorIndex::new();
    index.create_collection("alice", schema(2)).await.unwrap();
    index.create_collection("bob", schema(2)).await.unwrap();
    index.upsert("alice", &[unit_point("secret", 0, vec![1.0, 0.0])]).await.unwrap();

    assert!(index.search("bob", &[1.0, 0.0], 5).await.unwrap().is_empty());

    index.delete_collection("alice").await.unwrap();
    assert!(index.collection_info("alice").await.unwrap().is_none());
    assert!(index.collection_info("bob").await.unwrap().is_some());
}
