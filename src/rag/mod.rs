// RAG orchestration
// Ingestion (load, chunk, embed, upsert) and query-time retrieval plus synthesis

pub mod errors;
pub mod pacing;


use anyhow::anyhow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{VectorRecord, VectorStore};
use crate::documents::{Document, Source, load_file};
use crate::embeddings::chunking::{ChunkingConfig, Node, chunk_document, chunk_documents};
use crate::embeddings::{EmbeddingProvider, OpenAiClient};
use crate::http::run_blocking;
use crate::namespace::{Namespace, PartitionKey, namespace_for};
use crate::notion::{NotionClient, PageSource};
use crate::synthesis::{ResponseGenerator, compose_prompt};
use crate::{RagError, Result};

pub use errors::{IngestError, QueryError, SyncError};
pub use pacing::Pacer;

/// A namespace that was just written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHandle {
    partition_key: PartitionKey,
    namespace: Namespace,
    records: usize,
}

impl IndexHandle {
    #[inline]
    pub fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    #[inline]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Number of chunks written by the operation that produced this handle
    #[inline]
    pub fn records(&self) -> usize {
        self.records
    }
}

/// Drives ingestion into per-partition namespaces and answers questions against them
pub struct RagManager {
    store: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn ResponseGenerator>,
    page_source: Option<Arc<dyn PageSource>>,
    chunking: ChunkingConfig,
    top_k: usize,
    similarity_cutoff: Option<f32>,
    pacer: Pacer,
    operation_timeout: Duration,
}

impl RagManager {
    #[inline]
    pub fn new(
        config: &Config,
        store: VectorStore,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        if embedder.dimension() != store.dimension() {
            warn!(
                "Embedding provider produces {} dimensions but the vector store expects {}",
                embedder.dimension(),
                store.dimension()
            );
        }

        Self {
            store,
            embedder,
            generator,
            page_source: None,
            chunking: config.chunking.clone(),
            top_k: config.rag.top_k,
            similarity_cutoff: config.rag.similarity_cutoff,
            pacer: Pacer::new(config.rag.min_ingest_duration()),
            operation_timeout: config.rag.operation_timeout(),
        }
    }

    /// Wire up the OpenAI client, the on-disk vector store and, when a key is set, Notion
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(
            OpenAiClient::new(config).map_err(|e| RagError::Config(format!("{:#}", e)))?,
        );
        let store = VectorStore::new(config).await?;
        let manager = Self::new(config, store, Arc::clone(&client), client);

        if !config.notion.is_enabled() {
            debug!("Notion is not configured; page sync is unavailable");
            return Ok(manager);
        }

        let notion =
            NotionClient::new(config).map_err(|e| RagError::Config(format!("{:#}", e)))?;
        Ok(manager.with_page_source(Arc::new(notion)))
    }

    #[inline]
    pub fn with_page_source(mut self, page_source: Arc<dyn PageSource>) -> Self {
        self.page_source = Some(page_source);
        self
    }

    #[inline]
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Load, chunk, embed and upsert one source into the partition's namespace.
    ///
    /// The call never completes faster than the configured pacing floor,
    /// whether it succeeds or fails.
    #[inline]
    pub async fn ingest(
        &self,
        source: &Source,
        partition_key: &PartitionKey,
    ) -> std::result::Result<IndexHandle, IngestError> {
        self.pacer
            .pace(self.ingest_unpaced(source, partition_key))
            .await
    }

    async fn ingest_unpaced(
        &self,
        source: &Source,
        partition_key: &PartitionKey,
    ) -> std::result::Result<IndexHandle, IngestError> {
        let source_id = source.id();
        info!(
            "Ingesting {} ({}) into {}",
            source_id,
            source.kind(),
            partition_key
        );

        let documents = self
            .load_source(source)
            .await
            .map_err(|e| IngestError::LoadFailed {
                source_id: source_id.clone(),
                reason: format!("{:#}", e),
            })?;

        let ingestion_failed = |reason: String| IngestError::IngestionFailed {
            partition_key: partition_key.clone(),
            source_id: source_id.clone(),
            reason,
        };

        let nodes = chunk_documents(&documents, &self.chunking)
            .map_err(|e| ingestion_failed(format!("{:#}", e)))?;
        let namespace = namespace_for(partition_key);
        let records = self
            .embed_nodes(&nodes)
            .await
            .map_err(|e| ingestion_failed(format!("{:#}", e)))?;

        self.store
            .upsert_source(&namespace, &source_id, &records)
            .await
            .map_err(|e| ingestion_failed(e.to_string()))?;

        info!(
            "Ingested {} chunks from {} into {}",
            records.len(),
            source_id,
            namespace
        );

        Ok(IndexHandle {
            partition_key: partition_key.clone(),
            namespace,
            records: records.len(),
        })
    }

    /// Answer a question from the partition's documents. Never fails: every
    /// outcome, including errors, is turned into text for the user.
    #[inline]
    pub async fn answer(&self, query: &str, partition_key: &PartitionKey) -> String {
        match self.try_answer(query, partition_key).await {
            Ok(answer) => answer,
            Err(error) => {
                if error.is_failure() {
                    warn!("Answering for {} failed: {}", partition_key, error);
                } else {
                    debug!("No answer for {}: {}", partition_key, error);
                }
                error.to_string()
            }
        }
    }

    /// Retrieve the best matching chunks and synthesize an answer from them
    #[inline]
    pub async fn try_answer(
        &self,
        query: &str,
        partition_key: &PartitionKey,
    ) -> std::result::Result<String, QueryError> {
        let namespace = namespace_for(partition_key);

        if !self
            .store
            .namespace_exists(&namespace)
            .await
            .map_err(synthesis_failed)?
        {
            return Err(QueryError::PartitionNotFound);
        }

        let query_vector = self
            .bounded("Query embedding", self.embedder.embed_query(query))
            .await
            .map_err(|e| synthesis_failed(format!("{:#}", e)))?;

        let matches = self
            .store
            .search(&namespace, &query_vector, self.top_k)
            .await
            .map_err(synthesis_failed)?;

        let context: Vec<&str> = matches
            .iter()
            .filter(|found| {
                self.similarity_cutoff
                    .is_none_or(|cutoff| found.similarity_score >= cutoff)
            })
            .map(|found| found.chunk.metadata.text.as_str())
            .collect();

        debug!(
            "Retrieved {} of {} matches from {} for the query",
            context.len(),
            matches.len(),
            namespace
        );

        if context.is_empty() {
            return Err(QueryError::EmptyRetrieval);
        }

        let prompt = compose_prompt(query, &context);
        let answer = self
            .bounded("Response generation", self.generator.generate(&prompt))
            .await
            .map_err(|e| synthesis_failed(format!("{:#}", e)))?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(QueryError::EmptyAnswer);
        }

        Ok(answer.to_string())
    }

    /// Re-ingest one page into its own namespace, replacing whatever was there
    #[inline]
    pub async fn sync_page(&self, page_id: &str) -> std::result::Result<IndexHandle, SyncError> {
        let page_source = self.page_source.as_ref().ok_or(SyncError::NotConfigured)?;
        let partition_key = PartitionKey::NotionPage(page_id.to_string());
        let target = format!("Notion page {}", page_id);

        let document = self
            .bounded("Notion page load", page_source.load_page(page_id))
            .await
            .map_err(|e| SyncError::LoadFailed {
                target: target.clone(),
                reason: format!("{:#}", e),
            })?;

        self.replace_partition(partition_key, target, &[document])
            .await
    }

    /// Reload every page of the Notion database into the shared namespace
    #[inline]
    pub async fn sync_all(&self) -> std::result::Result<IndexHandle, SyncError> {
        let page_source = self.page_source.as_ref().ok_or(SyncError::NotConfigured)?;
        let target = "Notion database".to_string();

        let documents = self
            .bounded("Notion database load", page_source.load_all())
            .await
            .map_err(|e| SyncError::LoadFailed {
                target: target.clone(),
                reason: format!("{:#}", e),
            })?;

        let handle = self
            .replace_partition(PartitionKey::NotionShared, target, &documents)
            .await?;

        if let Err(e) = self.store.optimize(handle.namespace()).await {
            warn!("Failed to optimize {}: {}", handle.namespace(), e);
        }

        Ok(handle)
    }

    async fn replace_partition(
        &self,
        partition_key: PartitionKey,
        target: String,
        documents: &[Document],
    ) -> std::result::Result<IndexHandle, SyncError> {
        let namespace = namespace_for(&partition_key);
        let sync_failed = |reason: String| SyncError::SyncFailed {
            target: target.clone(),
            namespace: namespace.clone(),
            reason,
        };

        // Each page restarts its chunk numbering so ids only depend on the page itself
        let mut nodes = Vec::new();
        for document in documents {
            nodes.extend(
                chunk_document(document, &self.chunking)
                    .map_err(|e| sync_failed(format!("{:#}", e)))?,
            );
        }

        let records = self
            .embed_nodes(&nodes)
            .await
            .map_err(|e| sync_failed(format!("{:#}", e)))?;

        self.store
            .replace_namespace(&namespace, &records)
            .await
            .map_err(|e| sync_failed(e.to_string()))?;

        info!(
            "Synced {} ({} documents, {} chunks) into {}",
            target,
            documents.len(),
            records.len(),
            namespace
        );

        Ok(IndexHandle {
            partition_key,
            namespace,
            records: records.len(),
        })
    }

    async fn load_source(&self, source: &Source) -> anyhow::Result<Vec<Document>> {
        match source {
            Source::File(path) => {
                let path = path.clone();
                run_blocking(move || load_file(&path)).await
            }
            Source::NotionPage(page_id) => {
                let page_source = self
                    .page_source
                    .as_ref()
                    .ok_or_else(|| anyhow!("No page source is configured"))?;
                let document = self
                    .bounded("Notion page load", page_source.load_page(page_id))
                    .await?;
                Ok(vec![document])
            }
        }
    }

    async fn embed_nodes(&self, nodes: &[Node]) -> anyhow::Result<Vec<VectorRecord>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = nodes.iter().map(|node| node.text.clone()).collect();
        let vectors = self
            .bounded("Embedding", self.embedder.embed_texts(&texts))
            .await?;

        if vectors.len() != nodes.len() {
            return Err(anyhow!(
                "Embedding service returned {} vectors for {} chunks",
                vectors.len(),
                nodes.len()
            ));
        }

        let ingested_at = chrono::Utc::now().to_rfc3339();
        Ok(nodes
            .iter()
            .zip(vectors)
            .map(|(node, vector)| VectorRecord::from_node(node, vector, &ingested_at))
            .collect())
    }

    /// Bound a call to an external service by the operation timeout
    async fn bounded<T, F>(&self, operation: &str, future: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::time::timeout(self.operation_timeout, future)
            .await
            .map_err(|_| anyhow!("{} timed out after {:?}", operation, self.operation_timeout))?
    }
}

fn synthesis_failed(cause: impl std::fmt::Display) -> QueryError {
    QueryError::SynthesisFailed(cause.to_string())
}
