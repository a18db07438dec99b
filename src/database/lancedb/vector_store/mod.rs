
use super::{ChunkMetadata, EmbeddingRecord};
use crate::{ChatDocError, Result, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const TABLE_NAME: &str = "embeddings";

/// Durable vector index backed by a single LanceDB table.
///
/// Every row in the table has the same vector dimension. An empty table can
/// switch dimension on the next append; a populated one rejects mismatches.
pub struct VectorStore {
    connection: Connection,
    db_path: PathBuf,
    vector_dimension: usize,
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub metadata: ChunkMetadata,
    /// Squared L2 distance to the query vector, lower is closer
    pub distance: f32,
}

impl VectorStore {
    /// Open the index under the configured base directory, creating it when absent
    /// and recreating it when the stored data cannot be read.
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Opening LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            ChatDocError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let connection = Self::connect(&db_path).await?;

        let mut store = Self {
            connection,
            db_path,
            vector_dimension: config.ollama.embedding_dimension as usize,
        };

        store.initialize_table_with_recovery().await?;

        info!(
            "Vector store ready at {:?} ({} dimensions)",
            store.db_path, store.vector_dimension
        );
        Ok(store)
    }

    async fn connect(db_path: &Path) -> Result<Connection> {
        let uri = format!("file://{}", db_path.display());
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to connect to LanceDB: {}", e)))
    }

    /// Dimension every stored vector has
    #[inline]
    pub fn dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Location of the LanceDB directory
    #[inline]
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.iter().any(|name| name == TABLE_NAME))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to open table: {}", e)))
    }

    /// Create the table if it does not exist, otherwise adopt its stored dimension
    async fn initialize_table(&mut self) -> Result<()> {
        if self.table_exists().await? {
            let dimension = self.detect_existing_vector_dimension().await?;
            if dimension != self.vector_dimension {
                info!(
                    "Existing index uses {} dimensions (configured {})",
                    dimension, self.vector_dimension
                );
            }
            self.vector_dimension = dimension;
            return Ok(());
        }

        self.create_table(self.vector_dimension).await?;
        info!(
            "Embeddings table created with {} dimensions",
            self.vector_dimension
        );
        Ok(())
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to get table schema: {}", e)))?;

        let field = schema
            .field_with_name("vector")
            .map_err(|_| ChatDocError::Database("Missing vector column".to_string()))?;

        match field.data_type() {
            DataType::FixedSizeList(_, size) if *size > 0 => Ok(*size as usize),
            other => Err(ChatDocError::Database(format!(
                "Invalid vector column type: {}",
                other
            ))),
        }
    }

    async fn create_table(&self, vector_dim: usize) -> Result<()> {
        self.connection
            .create_empty_table(TABLE_NAME, create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    /// Append a batch of records to the index.
    ///
    /// All records must share one dimension. When it differs from the index
    /// dimension the batch is rejected, unless the index is still empty, in
    /// which case the table is recreated with the new dimension. Returns the
    /// number of rows written.
    #[inline]
    pub async fn merge(&mut self, records: Vec<EmbeddingRecord>) -> Result<usize> {
        let Some(first) = records.first() else {
            debug!("No embeddings to store");
            return Ok(0);
        };

        let vector_dim = first.vector.len();
        if vector_dim == 0 {
            return Err(ChatDocError::Database(
                "Refusing to store empty vectors".to_string(),
            ));
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(ChatDocError::Database(format!(
                "Batch mixes vector dimensions: {} and {}",
                vector_dim,
                bad.vector.len()
            )));
        }

        if vector_dim != self.vector_dimension {
            if !self.is_empty().await? {
                return Err(ChatDocError::Database(format!(
                    "Embedding dimension {} does not match index dimension {}",
                    vector_dim, self.vector_dimension
                )));
            }

            info!(
                "Empty index switching from {} to {} dimensions",
                self.vector_dimension, vector_dim
            );
            self.drop_table_if_exists().await?;
            self.create_table(vector_dim).await?;
            self.vector_dimension = vector_dim;
        }

        debug!("Appending batch of {} embeddings", records.len());

        let record_batch = create_record_batch(&records, self.vector_dimension)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.open_table()
            .await?
            .add(reader)
            .execute()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to insert embeddings: {}", e)))?;

        info!("Stored {} embeddings", records.len());
        Ok(records.len())
    }

    /// Find the `limit` entries nearest to `query_vector`, closest first.
    /// Returns every entry when fewer than `limit` exist.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if query_vector.len() != self.vector_dimension {
            return Err(ChatDocError::Database(format!(
                "Query vector has {} dimensions, index has {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let mut results = self
            .open_table()
            .await?
            .vector_search(query_vector)
            .map_err(|e| ChatDocError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to execute search: {}", e)))?;

        let mut search_results = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(parse_search_batch(&batch)?);
        }

        search_results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        search_results.truncate(limit);

        debug!("Search returned {} results", search_results.len());
        Ok(search_results)
    }

    /// Get the total number of embeddings stored
    #[inline]
    pub async fn count_embeddings(&self) -> Result<u64> {
        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// True until the first batch is merged
    #[inline]
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.count_embeddings().await? == 0)
    }

    /// Distinct source filenames present in the index, sorted
    #[inline]
    pub async fn list_sources(&self) -> Result<Vec<String>> {
        let count = self.count_embeddings().await?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut stream = self
            .open_table()
            .await?
            .query()
            .select(Select::columns(&["source"]))
            .limit(count as usize)
            .execute()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to scan sources: {}", e)))?;

        let mut sources = BTreeSet::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| ChatDocError::Database(format!("Failed to read source stream: {}", e)))?
        {
            let column = string_column(&batch, "source")?;
            for row in 0..batch.num_rows() {
                sources.insert(column.value(row).to_string());
            }
        }

        Ok(sources.into_iter().collect())
    }

    fn table_dir(&self) -> PathBuf {
        self.db_path.join(format!("{}.lance", TABLE_NAME))
    }

    /// Move an unreadable table out of the database directory, keeping its files
    fn backup_corrupt_table(&self) -> Result<PathBuf> {
        let table_dir = self.table_dir();
        let backup_path = self.db_path.with_file_name(format!(
            "{}-{}.corrupted_backup",
            TABLE_NAME,
            Utc::now().format("%Y%m%dT%H%M%S%.f")
        ));

        std::fs::rename(&table_dir, &backup_path).map_err(|e| {
            ChatDocError::Database(format!(
                "Failed to back up corrupted table {:?}: {}",
                table_dir, e
            ))
        })?;

        info!("Corrupted table backed up to {:?}", backup_path);
        Ok(backup_path)
    }

    /// Open the existing table, or recreate it when its files are readable but
    /// LanceDB cannot make sense of them. Errors reading the files themselves
    /// are returned untouched.
    async fn initialize_table_with_recovery(&mut self) -> Result<()> {
        let err = match self.initialize_table().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let table_dir = self.table_dir();
        if !table_dir.exists() {
            return Err(err);
        }
        if let Err(io_err) = check_readable(&table_dir) {
            error!("Embeddings table at {:?} is not readable: {}", table_dir, io_err);
            return Err(ChatDocError::Database(format!(
                "Embeddings table is not readable ({}): {}",
                io_err, err
            )));
        }

        warn!("Table corruption detected during initialization: {}", err);
        self.backup_corrupt_table()?;

        self.initialize_table().await.map_err(|e| {
            ChatDocError::Database(format!(
                "Failed to recreate table after corruption: {}",
                e
            ))
        })
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping existing embeddings table");
            self.connection
                .drop_table(TABLE_NAME)
                .await
                .map_err(|e| ChatDocError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    /// Check that the table exists and can be counted
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool> {
        debug!("Validating database integrity");

        match self.table_exists().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Embeddings table missing during integrity check");
                return Ok(false);
            }
            Err(e) => {
                error!("Failed to list tables during integrity check: {}", e);
                return Ok(false);
            }
        }

        match self.count_embeddings().await {
            Ok(count) => {
                debug!("Database integrity check passed, {} rows found", count);
                Ok(true)
            }
            Err(e) => {
                error!("Integrity check failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Drop all entries and recreate an empty table
    #[inline]
    pub async fn repair_database(&mut self) -> Result<()> {
        info!("Starting database repair");

        if let Err(e) = self.drop_table_if_exists().await {
            warn!("Failed to drop table during repair: {}", e);
        }

        self.create_table(self.vector_dimension).await.map_err(|e| {
            ChatDocError::Database(format!("Failed to recreate table during repair: {}", e))
        })?;

        info!("Database repair completed successfully");
        Ok(())
    }
}

/// Open every file under `dir`, surfacing permission and IO errors
fn check_readable(dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            check_readable(&path)?;
        } else {
            std::fs::File::open(&path)?;
        }
    }
    Ok(())
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn create_record_batch(records: &[EmbeddingRecord], vector_dim: usize) -> Result<RecordBatch> {
    let flat_values: Vec<f32> = records
        .iter()
        .flat_map(|record| record.vector.iter().copied())
        .collect();

    let item_field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array = FixedSizeListArray::try_new(
        item_field,
        vector_dim as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| ChatDocError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.id.as_str()),
        )),
        Arc::new(vector_array),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.source.as_str()),
        )),
        Arc::new(UInt32Array::from_iter_values(
            records.iter().map(|r| r.metadata.page),
        )),
        Arc::new(UInt32Array::from_iter_values(
            records.iter().map(|r| r.metadata.chunk_index),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.content.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.created_at.as_str()),
        )),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| ChatDocError::Database(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ChatDocError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| ChatDocError::Database(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ChatDocError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| ChatDocError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let sources = string_column(batch, "source")?;
    let pages = u32_column(batch, "page")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;
    let contents = string_column(batch, "content")?;
    let created_ats = string_column(batch, "created_at")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    Ok((0..batch.num_rows())
        .map(|row| SearchResult {
            metadata: ChunkMetadata {
                source: sources.value(row).to_string(),
                page: pages.value(row),
                chunk_index: chunk_indices.value(row),
                content: contents.value(row).to_string(),
                created_at: created_ats.value(row).to_string(),
            },
            distance: distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
        })
        .collect())
}
