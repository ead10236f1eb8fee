use thiserror::Error;

use crate::namespace::{Namespace, PartitionKey};

pub const NO_KNOWLEDGE_BASE: &str = "No knowledge base found. Please upload some documents first.";
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in the knowledge base.";
pub const NO_MEANINGFUL_RESPONSE: &str =
    "I couldn't generate a meaningful response from the available information.";
pub const GENERATION_ERROR_PREFIX: &str = "An error occurred while generating the response: ";

/// Failures while loading, chunking, embedding or storing a source
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to load {source_id}: {reason}")]
    LoadFailed { source_id: String, reason: String },

    #[error("Failed to ingest {source_id} into {partition_key}: {reason}")]
    IngestionFailed {
        partition_key: PartitionKey,
        source_id: String,
        reason: String,
    },
}

/// Why a question produced no synthesized answer.
///
/// The display text of every variant is the message handed back to the user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{}", NO_KNOWLEDGE_BASE)]
    PartitionNotFound,

    #[error("{}", NO_RELEVANT_INFORMATION)]
    EmptyRetrieval,

    #[error("{}", NO_MEANINGFUL_RESPONSE)]
    EmptyAnswer,

    #[error("An error occurred while generating the response: {0}")]
    SynthesisFailed(String),
}

impl QueryError {
    /// Sentinel outcomes are expected; only synthesis failures indicate a fault
    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SynthesisFailed(_))
    }
}

/// Failures while re-syncing external pages
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No page source is configured (set NOTION_API_KEY)")]
    NotConfigured,

    #[error("Failed to load {target}: {reason}")]
    LoadFailed { target: String, reason: String },

    #[error("Failed to sync {target} into {namespace}: {reason}")]
    SyncFailed {
        target: String,
        namespace: Namespace,
        reason: String,
    },
}
