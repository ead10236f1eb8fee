// Embeddings module
// Chunking of loaded documents and the embedding provider seam

pub mod chunking;
pub mod openai;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

pub use chunking::{ChunkingConfig, Node, chunk_document, chunk_documents, count_units, node_id};
pub use openai::{DEFAULT_EMBEDDING_DIMENSION, OpenAiClient};

/// Turns text into fixed-dimension vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in input order
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow!("Embedding service returned no vector for the query"))
    }

    fn dimension(&self) -> usize;
}
