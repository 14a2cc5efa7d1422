//! # RAG with Qdrant, TEI and Gemini
//!
//! The production wiring: a Qdrant collection per user, embeddings from a
//! text-embeddings-inference server running `BAAI/bge-large-en-v1.5`, and
//! answers from Gemini.
//!
//! Requires a reachable Qdrant and TEI server plus `GEMINI_API_KEY` (or
//! `GOOGLE_API_KEY`). Endpoints come from the environment or a `.env` file:
//! `QDRANT_URL`, `QDRANT_API_KEY`, `TEI_URL`, `GEMINI_MODEL`.
//!
//! Run: `cargo run -p mria-demos --example rag_qdrant --features remote -- <user> <question>`

use std::sync::Arc;

use mria_demos::sample_requests;
use mria_rag::{
    GeminiGenerator, QdrantVectorIndex, QueryRequest, RagConfig, RagPipeline, ServiceEndpoints,
    TeiEmbeddingProvider,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    mria_telemetry::init_json_telemetry("mria-rag-qdrant")?;

    let mut args = std::env::args().skip(1);
    let user = args.next().unwrap_or_else(|| "user1".to_string());
    let question = args.next().unwrap_or_else(|| "What color was the mat?".to_string());

    let endpoints = ServiceEndpoints::from_env();
    info!(qdrant = %endpoints.qdrant_url, tei = %endpoints.tei_url, model = %endpoints.gemini_model, "connecting");

    let pipeline = RagPipeline::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(TeiEmbeddingProvider::from_endpoints(&endpoints)?))
        .vector_index(Arc::new(QdrantVectorIndex::from_endpoints(&endpoints)?))
        .generator(Arc::new(GeminiGenerator::from_endpoints(&endpoints)?))
        .build()?;

    // The collection is named after the user and created on first ingest.
    let total = pipeline.ingest_batch(&sample_requests(&user)?).await?;
    println!("ingested {total} chunk(s) for {user}");

    let answer = pipeline.answer(&QueryRequest::new(user.as_str(), question.as_str())).await?;
    println!("\nQ: {question}\nA: {}", answer.text);
    for source in &answer.sources {
        println!("   [{:.3}] {}#{}", source.score, source.document_id, source.chunk_index);
    }

    Ok(())
}
