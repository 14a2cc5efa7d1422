//! # RAG Basic Example
//!
//! Ingests a few uploads for one user and answers questions about them.
//!
//! Uses `InMemoryVectorIndex`, the `HashingEmbeddingProvider` and an offline
//! extractive generator, so it runs with **zero API keys**.
//!
//! Run: `cargo run -p mria-demos --example rag_basic`

use std::sync::Arc;

use mria_demos::{ExtractiveGenerator, sample_requests};
use mria_rag::{
    HashingEmbeddingProvider, InMemoryVectorIndex, QueryRequest, RagConfig, RagError, RagPipeline,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    mria_telemetry::init_telemetry("mria-rag-basic")?;

    // -- 1. Configure the pipeline ----------------------------------------
    // Small chunks so the short samples split into several passages.
    let config = RagConfig::builder().chunk_size(120).chunk_overlap(20).default_top_k(3).build()?;

    // -- 2. Build the pipeline with in-memory components ------------------
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(1024)))
        .vector_index(Arc::new(InMemoryVectorIndex::new()))
        .generator(Arc::new(ExtractiveGenerator))
        .build()?;

    // -- 3. Ingest the demo user's uploads ---------------------------------
    let user = "user1";
    for request in sample_requests(user)? {
        let stored = pipeline.ingest(&request).await?;
        println!("  {} ({}) → {stored} chunk(s)", request.document.id, request.document.document_type);
    }

    // -- 4. Ask questions ----------------------------------------------------
    let questions = ["What color was the mat?", "How does Rust stay memory safe?", "Who won?"];
    for question in questions {
        let answer = pipeline.answer(&QueryRequest::new(user, question)).await?;
        println!("\nQ: {question}\nA: {}", answer.text);
        for source in &answer.sources {
            println!("   [{:.3}] {}#{}", source.score, source.document_id, source.chunk_index);
        }
    }

    // -- 5. A user who never uploaded anything ------------------------------
    match pipeline.answer(&QueryRequest::new("user_new", "hello")).await {
        Err(RagError::CollectionNotFound { collection }) => {
            println!("\nuser_new: no collection '{collection}' yet, nothing to ground an answer on");
        }
        other => println!("\nuser_new: unexpected {other:?}"),
    }

    Ok(())
}
