// Database module
// Vector storage for chunk embeddings, one LanceDB table per namespace

pub mod lancedb;

pub use lancedb::{ChunkMetadata, SearchResult, StoredChunk, VectorRecord, VectorStore};
