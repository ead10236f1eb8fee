
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::documents::{Document, DocumentMetadata};

/// A slice of a document ready for embedding, linked to its neighbours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Deterministic id derived from the source and position
    pub id: String,
    /// Exact source text covered by this node
    pub text: String,
    pub metadata: DocumentMetadata,
    /// Position of this node among all nodes cut from the same source
    pub index: usize,
    /// Number of units (whitespace-delimited tokens) in `text`
    pub unit_count: usize,
    pub prev: Option<String>,
    pub next: Option<String>,
}

/// Configuration for fixed-window chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in units
    pub chunk_size: usize,
    /// Units shared by consecutive windows; must be smaller than `chunk_size`
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 256,
            chunk_overlap: 50,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    fn check(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(anyhow!(
                "Invalid chunking parameters: size {} overlap {}",
                self.chunk_size,
                self.chunk_overlap
            ));
        }
        Ok(())
    }
}

/// Chunk a single document
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Result<Vec<Node>> {
    config.check()?;
    let mut nodes = Vec::new();
    push_document_nodes(document, config, &mut nodes);
    link_nodes(&mut nodes);
    Ok(nodes)
}

/// Chunk every document loaded from one source.
///
/// Indices run across all documents so ids stay unique; neighbour links never
/// cross a document boundary.
#[inline]
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Result<Vec<Node>> {
    config.check()?;

    let mut nodes = Vec::new();
    for document in documents {
        let first = nodes.len();
        push_document_nodes(document, config, &mut nodes);
        if let Some(slice) = nodes.get_mut(first..) {
            link_nodes(slice);
        }
    }

    debug!(
        "Chunked {} documents into {} nodes (size {}, overlap {})",
        documents.len(),
        nodes.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    Ok(nodes)
}

fn push_document_nodes(document: &Document, config: &ChunkingConfig, nodes: &mut Vec<Node>) {
    let spans = unit_spans(&document.text);
    if spans.is_empty() {
        return;
    }

    let stride = config.stride();
    let mut start = 0;

    loop {
        let end = (start + config.chunk_size).min(spans.len());
        let (Some(first), Some(last)) = (spans.get(start), spans.get(end - 1)) else {
            break;
        };

        let text = document
            .text
            .get(first.0..last.1)
            .unwrap_or_default()
            .to_string();
        let index = nodes.len();

        nodes.push(Node {
            id: node_id(&document.metadata.source, index),
            text,
            metadata: document.metadata.clone(),
            index,
            unit_count: end - start,
            prev: None,
            next: None,
        });

        if end == spans.len() {
            break;
        }
        start += stride;
    }
}

fn link_nodes(nodes: &mut [Node]) {
    let ids: Vec<String> = nodes.iter().map(|node| node.id.clone()).collect();
    for (position, node) in nodes.iter_mut().enumerate() {
        node.prev = position
            .checked_sub(1)
            .and_then(|prev| ids.get(prev))
            .cloned();
        node.next = ids.get(position + 1).cloned();
    }
}

/// Byte ranges of every whitespace-delimited unit in `text`
fn unit_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut unit_start = None;

    for (offset, ch) in text.char_indices() {
        match (ch.is_whitespace(), unit_start) {
            (true, Some(start)) => {
                spans.push((start, offset));
                unit_start = None;
            }
            (false, None) => unit_start = Some(offset),
            _ => {}
        }
    }

    if let Some(start) = unit_start {
        spans.push((start, text.len()));
    }

    spans
}

/// Count the chunking units in a piece of text
#[inline]
pub fn count_units(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Stable id for the node at `index` of `source`
#[inline]
pub fn node_id(source: &str, index: usize) -> String {
    let name = format!("{}#{}", source, index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
