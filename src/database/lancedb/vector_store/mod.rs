
use super::{ChunkMetadata, VectorRecord};
use crate::namespace::Namespace;
use crate::{RagError, Result, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Vector database store using LanceDB, one table per namespace
pub struct VectorStore {
    connection: Connection,
    vector_dimension: usize,
}

/// A stored chunk as read back from a namespace
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub metadata: ChunkMetadata,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity, `1 - distance`
    pub similarity_score: f32,
    pub distance: f32,
}

impl VectorStore {
    /// Open the store under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            config.openai.embedding_dimension as usize,
        )
        .await
    }

    /// Open (or create) a store at `db_path` holding vectors of `vector_dimension` floats
    #[inline]
    pub async fn open(db_path: &Path, vector_dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.display().to_string();

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        RagError::Database(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(RagError::Database(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        info!(
            "Vector store opened at {} ({} dimensions)",
            db_path.display(),
            vector_dimension
        );

        Ok(Self {
            connection,
            vector_dimension,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Whether anything was ever written to this namespace
    #[inline]
    pub async fn namespace_exists(&self, namespace: &Namespace) -> Result<bool> {
        let table_name = Self::table_name(namespace)?;
        Ok(self.table_names().await?.iter().any(|name| name == table_name))
    }

    /// Every namespace currently present, sorted by name
    #[inline]
    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let mut namespaces: Vec<Namespace> = self
            .table_names()
            .await?
            .into_iter()
            .map(Namespace::new)
            .collect();
        namespaces.sort();
        Ok(namespaces)
    }

    /// Replace every row previously written for `source_id` in `namespace` with `records`.
    ///
    /// Creates the namespace when it does not exist yet, even if `records` is empty.
    #[inline]
    pub async fn upsert_source(
        &self,
        namespace: &Namespace,
        source_id: &str,
        records: &[VectorRecord],
    ) -> Result<()> {
        self.check_dimensions(records)?;
        let table = self.ensure_table(namespace).await?;

        let predicate = format!("source = '{}'", escape_literal(source_id));
        table.delete(&predicate).await.map_err(|e| {
            RagError::Database(format!(
                "Failed to delete previous rows for {} in {}: {}",
                source_id, namespace, e
            ))
        })?;

        self.add_records(&table, records).await?;

        info!(
            "Upserted {} records for {} into namespace {}",
            records.len(),
            source_id,
            namespace
        );
        Ok(())
    }

    /// Drop everything in `namespace` and store `records` in its place
    #[inline]
    pub async fn replace_namespace(
        &self,
        namespace: &Namespace,
        records: &[VectorRecord],
    ) -> Result<()> {
        self.check_dimensions(records)?;
        self.drop_namespace(namespace).await?;
        let table = self.create_table(namespace).await?;
        self.add_records(&table, records).await?;

        info!(
            "Replaced namespace {} with {} records",
            namespace,
            records.len()
        );
        Ok(())
    }

    /// Nearest neighbours of `query_vector` within one namespace, best match first
    #[inline]
    pub async fn search(
        &self,
        namespace: &Namespace,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        debug!(
            "Searching namespace {} for similar vectors with limit: {}",
            namespace, limit
        );

        if query_vector.len() != self.vector_dimension {
            return Err(RagError::Database(format!(
                "Query vector has {} dimensions, store expects {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }

        let table = self.open_table(namespace).await?;

        let row_count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
        if row_count == 0 || limit == 0 {
            return Ok(Vec::new());
        }

        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let rows = Self::collect_rows(results).await?;
        let search_results = rank_matches(rows)?;

        debug!("Found {} matches in {}", search_results.len(), namespace);
        Ok(search_results)
    }

    /// Number of rows stored in a namespace; missing namespaces hold zero rows
    #[inline]
    pub async fn count_records(&self, namespace: &Namespace) -> Result<usize> {
        if !self.namespace_exists(namespace).await? {
            return Ok(0);
        }

        self.open_table(namespace)
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Read up to `limit` stored chunks, ordered by source and chunk index
    #[inline]
    pub async fn fetch_records(
        &self,
        namespace: &Namespace,
        limit: usize,
    ) -> Result<Vec<StoredChunk>> {
        let table = self.open_table(namespace).await?;

        let results = table
            .query()
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to query records: {}", e)))?;

        let mut chunks: Vec<StoredChunk> = Self::collect_rows(results)
            .await?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect();
        chunks.sort_by(|a, b| {
            a.metadata
                .source
                .cmp(&b.metadata.source)
                .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        Ok(chunks)
    }

    /// Remove a namespace; returns whether it existed
    #[inline]
    pub async fn drop_namespace(&self, namespace: &Namespace) -> Result<bool> {
        if !self.namespace_exists(namespace).await? {
            return Ok(false);
        }

        info!("Dropping namespace {}", namespace);
        self.connection
            .drop_table(namespace.as_str())
            .await
            .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        Ok(true)
    }

    /// Compact a namespace's table after large rewrites
    #[inline]
    pub async fn optimize(&self, namespace: &Namespace) -> Result<()> {
        debug!("Optimizing namespace {}", namespace);

        self.open_table(namespace)
            .await?
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::Database(format!("Failed to optimize table: {}", e)))?;

        info!("Namespace {} optimization completed", namespace);
        Ok(())
    }

    fn table_name(namespace: &Namespace) -> Result<&str> {
        if namespace.is_valid() {
            Ok(namespace.as_str())
        } else {
            Err(RagError::Database(format!(
                "Invalid namespace name: {:?}",
                namespace.as_str()
            )))
        }
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))
    }

    async fn open_table(&self, namespace: &Namespace) -> Result<Table> {
        let table_name = Self::table_name(namespace)?;
        self.connection
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to open namespace {}: {}", namespace, e))
            })
    }

    async fn ensure_table(&self, namespace: &Namespace) -> Result<Table> {
        let table = if self.namespace_exists(namespace).await? {
            self.open_table(namespace).await?
        } else {
            self.create_table(namespace).await?
        };

        let existing = Self::detect_vector_dimension(&table).await?;
        if existing != self.vector_dimension {
            return Err(RagError::Database(format!(
                "Namespace {} stores {}-dimensional vectors, expected {}",
                namespace, existing, self.vector_dimension
            )));
        }
        Ok(table)
    }

    async fn create_table(&self, namespace: &Namespace) -> Result<Table> {
        let table_name = Self::table_name(namespace)?;
        debug!(
            "Creating table {} with {} dimensions",
            table_name, self.vector_dimension
        );

        match self
            .connection
            .create_empty_table(table_name, self.create_schema())
            .execute()
            .await
        {
            Ok(table) => Ok(table),
            // Another writer created it between our existence check and now
            Err(lancedb::Error::TableAlreadyExists { .. }) => {
                debug!("Namespace {} already exists, opening it", namespace);
                self.open_table(namespace).await
            }
            Err(e) => {
                if !self.namespace_exists(namespace).await? {
                    return Err(RagError::Database(format!(
                        "Failed to create namespace {}: {}",
                        namespace, e
                    )));
                }
                debug!(
                    "Lost the race to create namespace {} ({}), opening it",
                    namespace, e
                );
                self.open_table(namespace).await
            }
        }
    }

    /// Detect vector dimension from an existing table schema
    async fn detect_vector_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::Database(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })
    }

    fn check_dimensions(&self, records: &[VectorRecord]) -> Result<()> {
        match records
            .iter()
            .find(|record| record.vector.len() != self.vector_dimension)
        {
            Some(record) => Err(RagError::Database(format!(
                "Record {} has {} dimensions, store expects {}",
                record.id,
                record.vector.len(),
                self.vector_dimension
            ))),
            None => Ok(()),
        }
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.vector_dimension as i32,
                ),
                false,
            ),
            Field::new("source", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("page_id", DataType::Utf8, true),
            Field::new("created_time", DataType::Utf8, true),
            Field::new("text", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("prev_id", DataType::Utf8, true),
            Field::new("next_id", DataType::Utf8, true),
            Field::new("ingested_at", DataType::Utf8, false),
        ]))
    }

    async fn add_records(&self, table: &Table, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No records to store");
            return Ok(());
        }

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert records: {}", e)))?;
        Ok(())
    }

    /// Create a RecordBatch from vector records
    fn create_record_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut sources = Vec::with_capacity(len);
        let mut titles = Vec::with_capacity(len);
        let mut page_ids = Vec::with_capacity(len);
        let mut created_times = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut prev_ids = Vec::with_capacity(len);
        let mut next_ids = Vec::with_capacity(len);
        let mut ingested_ats = Vec::with_capacity(len);

        for record in records {
            let metadata = &record.metadata;
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            sources.push(metadata.source.as_str());
            titles.push(metadata.title.as_str());
            page_ids.push(metadata.page_id.as_deref());
            created_times.push(metadata.created_time.as_deref());
            texts.push(metadata.text.as_str());
            chunk_indices.push(metadata.chunk_index);
            prev_ids.push(metadata.prev_id.as_deref());
            next_ids.push(metadata.next_id.as_deref());
            ingested_ats.push(metadata.ingested_at.as_str());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(page_ids)),
            Arc::new(StringArray::from(created_times)),
            Arc::new(StringArray::from(texts)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(prev_ids)),
            Arc::new(StringArray::from(next_ids)),
            Arc::new(StringArray::from(ingested_ats)),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    async fn collect_rows(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<(StoredChunk, Option<f32>)>> {
        let mut rows = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            rows.extend(Self::parse_batch(&batch)?);
        }

        Ok(rows)
    }

    /// Parse one record batch, pairing each row with its `_distance` when present
    fn parse_batch(batch: &RecordBatch) -> Result<Vec<(StoredChunk, Option<f32>)>> {
        let ids = string_column(batch, "id")?;
        let sources = string_column(batch, "source")?;
        let titles = string_column(batch, "title")?;
        let page_ids = string_column(batch, "page_id")?;
        let created_times = string_column(batch, "created_time")?;
        let texts = string_column(batch, "text")?;
        let prev_ids = string_column(batch, "prev_id")?;
        let next_ids = string_column(batch, "next_id")?;
        let ingested_ats = string_column(batch, "ingested_at")?;

        let chunk_indices = batch
            .column_by_name("chunk_index")
            .ok_or_else(|| RagError::Database("Missing chunk_index column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| RagError::Database("Invalid chunk_index column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let rows = (0..batch.num_rows())
            .map(|row| {
                let chunk = StoredChunk {
                    id: ids.value(row).to_string(),
                    metadata: ChunkMetadata {
                        source: sources.value(row).to_string(),
                        title: titles.value(row).to_string(),
                        page_id: optional_value(page_ids, row),
                        created_time: optional_value(created_times, row),
                        text: texts.value(row).to_string(),
                        chunk_index: chunk_indices.value(row),
                        prev_id: optional_value(prev_ids, row),
                        next_id: optional_value(next_ids, row),
                        ingested_at: ingested_ats.value(row).to_string(),
                    },
                };
                let distance = distances
                    .filter(|d| !d.is_null(row))
                    .map(|d| d.value(row));
                (chunk, distance)
            })
            .collect();

        Ok(rows)
    }

    /// Move a database directory that cannot be opened out of the way
    fn attempt_corruption_recovery(db_path: &Path) -> Result<()> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                RagError::Database(format!("Failed to remove corrupted database: {}", e))
            })?;
        }

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to recreate vector database directory: {}", e))
        })?;

        info!("Database corruption recovery completed");
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn optional_value(column: &StringArray, row: usize) -> Option<String> {
    (!column.is_null(row)).then(|| column.value(row).to_string())
}

/// Turn raw search rows into results ordered by ascending cosine distance.
///
/// Every row must carry a distance; a row without one cannot be ranked.
fn rank_matches(rows: Vec<(StoredChunk, Option<f32>)>) -> Result<Vec<SearchResult>> {
    let mut results = rows
        .into_iter()
        .map(|(chunk, distance)| {
            let distance = distance.ok_or_else(|| {
                RagError::Database(format!("Search result {} has no distance", chunk.id))
            })?;
            Ok(SearchResult {
                chunk,
                similarity_score: 1.0 - distance,
                distance,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(results)
}

/// Quote a value for use inside a single-quoted SQL predicate literal
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
