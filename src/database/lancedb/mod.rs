// LanceDB vector database module
// Handles vector storage and similarity search for chunk embeddings


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::embeddings::chunking::Node;

pub use vector_store::{SearchResult, StoredChunk, VectorStore};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Node id, stable across re-ingestion of the same source
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source id the chunk was cut from (file path or `notion_page_<id>`)
    pub source: String,
    pub title: String,
    pub page_id: Option<String>,
    /// RFC 3339 creation time of the source document, when known
    pub created_time: Option<String>,
    /// The chunk text
    pub text: String,
    /// Index of this chunk within its source (for ordering)
    pub chunk_index: u32,
    pub prev_id: Option<String>,
    pub next_id: Option<String>,
    /// RFC 3339 timestamp of the ingestion that wrote this row
    pub ingested_at: String,
}

impl VectorRecord {
    /// Pair a chunk with its embedding
    #[inline]
    pub fn from_node(node: &Node, vector: Vec<f32>, ingested_at: &str) -> Self {
        Self {
            id: node.id.clone(),
            vector,
            metadata: ChunkMetadata {
                source: node.metadata.source.clone(),
                title: node.metadata.title.clone(),
                page_id: node.metadata.page_id.clone(),
                created_time: node.metadata.created_time.map(|time| time.to_rfc3339()),
                text: node.text.clone(),
                chunk_index: u32::try_from(node.index).unwrap_or(u32::MAX),
                prev_id: node.prev.clone(),
                next_id: node.next.clone(),
                ingested_at: ingested_at.to_string(),
            },
        }
    }
}
