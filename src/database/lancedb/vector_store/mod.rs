
use super::{ChunkMetadata, EmbeddingRecord, RelevantChunk, validate_paper_id};
use crate::config::Config;
use crate::{PaperError, Result};
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

pub const PAPER_CHUNKS_TABLE: &str = "paper_chunks";

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
}

impl VectorStore {
    /// Open the store under the configured vector directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            config.ollama.embedding_dimension as usize,
        )
        .await
    }

    /// Open or create a store at `db_path`.
    ///
    /// `default_dimension` sizes the vector column of a freshly created
    /// table; an existing table keeps its own dimension until a write with a
    /// different width recreates it.
    #[inline]
    pub async fn open(db_path: &Path, default_dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            PaperError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy().into_owned();

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) if looks_corrupted(&e.to_string()) => {
                warn!("Database corruption detected, attempting recovery: {}", e);
                Self::attempt_corruption_recovery(db_path)?;
                lancedb::connect(&uri).execute().await.map_err(|e| {
                    PaperError::Database(format!(
                        "Failed to connect to LanceDB after recovery: {}",
                        e
                    ))
                })?
            }
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);
                return Err(PaperError::Database(format!(
                    "Failed to connect to LanceDB: {}",
                    e
                )));
            }
        };

        let mut store = Self {
            connection,
            table_name: PAPER_CHUNKS_TABLE.to_string(),
            vector_dimension: default_dimension,
        };

        store.initialize_table().await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    async fn initialize_table(&mut self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| PaperError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            match self.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    self.vector_dimension = dim;
                    debug!("Detected existing vector dimension: {}", dim);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Existing chunk table is unreadable, recreating: {}", e);
                    self.drop_table_if_exists().await?;
                }
            }
        }

        self.connection
            .create_empty_table(&self.table_name, create_schema(self.vector_dimension))
            .execute()
            .await
            .map_err(|e| PaperError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Created {} table with {} dimensions",
            self.table_name, self.vector_dimension
        );
        Ok(())
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| PaperError::Database(format!("Failed to get table schema: {}", e)))?;

        let field = schema
            .field_with_name("vector")
            .map_err(|_| PaperError::Database("Missing vector column".to_string()))?;

        match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size)
                .map_err(|_| PaperError::Database(format!("Invalid vector width {}", size))),
            other => Err(PaperError::Database(format!(
                "Unexpected vector column type: {}",
                other
            ))),
        }
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| PaperError::Database(format!("Failed to open table: {}", e)))
    }

    /// Store embedded chunks.
    ///
    /// A batch whose vector width differs from the table's drops and
    /// recreates the table, discarding every stored chunk. Returns whether
    /// that happened.
    #[inline]
    pub async fn add_paper_chunks(&mut self, records: Vec<EmbeddingRecord>) -> Result<bool> {
        let Some(first) = records.first() else {
            debug!("No chunks to store");
            return Ok(false);
        };

        let vector_dim = first.vector.len();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(PaperError::Database(format!(
                "Chunk {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        let recreated = vector_dim != self.vector_dimension;
        if recreated {
            warn!(
                "Vector dimension changed from {} to {}, recreating table",
                self.vector_dimension, vector_dim
            );
            self.drop_table_if_exists().await?;
            self.vector_dimension = vector_dim;
            self.initialize_table().await?;
        }

        let record_batch = self.create_record_batch(&records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.open_table()
            .await?
            .add(reader)
            .execute()
            .await
            .map_err(|e| PaperError::Database(format!("Failed to insert chunks: {}", e)))?;

        info!("Stored {} chunks", records.len());
        Ok(recreated)
    }

    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut flat_values = Vec::with_capacity(len * vector_dim);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }

        let dimension = i32::try_from(vector_dim)
            .map_err(|_| PaperError::Database(format!("Invalid vector width {}", vector_dim)))?;
        let item = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array =
            FixedSizeListArray::try_new(item, dimension, Arc::new(Float32Array::from(flat_values)), None)
                .map_err(|e| {
                    PaperError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let strings = |f: fn(&EmbeddingRecord) -> &str| -> Arc<dyn Array> {
            Arc::new(StringArray::from(records.iter().map(f).collect::<Vec<_>>()))
        };

        let arrays: Vec<Arc<dyn Array>> = vec![
            strings(|r| r.id.as_str()),
            Arc::new(vector_array),
            strings(|r| r.metadata.chunk_id.as_str()),
            strings(|r| r.metadata.paper_id.as_str()),
            strings(|r| r.metadata.paper_title.as_str()),
            strings(|r| r.metadata.section.as_str()),
            Arc::new(UInt32Array::from_iter_values(
                records.iter().map(|r| r.metadata.page_number),
            )),
            Arc::new(UInt32Array::from_iter_values(
                records.iter().map(|r| r.metadata.chunk_index),
            )),
            strings(|r| r.metadata.content.as_str()),
            strings(|r| r.metadata.created_at.as_str()),
        ];

        RecordBatch::try_new(create_schema(vector_dim), arrays)
            .map_err(|e| PaperError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest chunks of one paper by cosine distance, closest first
    #[inline]
    pub async fn search_relevant_chunks(
        &self,
        query_vector: &[f32],
        paper_id: &str,
        n_results: usize,
    ) -> Result<Vec<RelevantChunk>> {
        let paper_id = validate_paper_id(paper_id)?;
        debug!(
            "Searching {} chunks of paper {} (limit {})",
            self.table_name, paper_id, n_results
        );

        if n_results == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.vector_dimension {
            return Err(PaperError::Database(format!(
                "Query has {} dimensions, table stores {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }

        let mut results = self
            .open_table()
            .await?
            .vector_search(query_vector)
            .map_err(|e| PaperError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(paper_filter(paper_id))
            .limit(n_results)
            .execute()
            .await
            .map_err(|e| PaperError::Database(format!("Failed to execute search: {}", e)))?;

        let mut chunks = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| PaperError::Database(format!("Failed to read result stream: {}", e)))?
        {
            chunks.extend(parse_search_batch(&batch)?);
        }

        chunks.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!("Found {} relevant chunks", chunks.len());
        Ok(chunks)
    }

    /// Remove every chunk of a paper
    #[inline]
    pub async fn delete_paper(&self, paper_id: &str) -> Result<()> {
        let paper_id = validate_paper_id(paper_id)?;
        debug!("Deleting chunks for paper: {}", paper_id);

        self.open_table()
            .await?
            .delete(&paper_filter(paper_id))
            .await
            .map_err(|e| PaperError::Database(format!("Failed to delete paper chunks: {}", e)))?;

        info!("Deleted chunks for paper: {}", paper_id);
        Ok(())
    }

    #[inline]
    pub async fn count_chunks(&self) -> Result<usize> {
        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| PaperError::Database(format!("Failed to count rows: {}", e)))
    }

    #[inline]
    pub async fn count_paper_chunks(&self, paper_id: &str) -> Result<usize> {
        let paper_id = validate_paper_id(paper_id)?;

        self.open_table()
            .await?
            .count_rows(Some(paper_filter(paper_id)))
            .await
            .map_err(|e| PaperError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Whether the chunk table can be listed, opened and counted
    #[inline]
    pub async fn validate_integrity(&self) -> bool {
        match self.count_chunks().await {
            Ok(count) => {
                debug!("Vector store integrity check passed, {} rows", count);
                true
            }
            Err(e) => {
                error!("Vector store integrity check failed: {}", e);
                false
            }
        }
    }

    fn attempt_corruption_recovery(db_path: &Path) -> Result<()> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            std::fs::rename(db_path, &backup_path).map_err(|e| {
                PaperError::Database(format!("Failed to back up corrupted database: {}", e))
            })?;
            info!("Corrupted database backed up to {:?}", backup_path);
        }

        std::fs::create_dir_all(db_path)?;
        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        let table_names =
            self.connection.table_names().execute().await.map_err(|e| {
                PaperError::Database(format!("Failed to list tables for drop: {}", e))
            })?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing {} table", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| PaperError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }
}

fn looks_corrupted(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("corrupt") || message.contains("malformed")
}

fn paper_filter(paper_id: &str) -> String {
    format!("paper_id = '{}'", paper_id)
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                i32::try_from(vector_dim).unwrap_or(i32::MAX),
            ),
            false,
        ),
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("paper_id", DataType::Utf8, false),
        Field::new("paper_title", DataType::Utf8, false),
        Field::new("section", DataType::Utf8, false),
        Field::new("page_number", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PaperError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PaperError::Database(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PaperError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| PaperError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<RelevantChunk>> {
    let chunk_ids = string_column(batch, "chunk_id")?;
    let paper_ids = string_column(batch, "paper_id")?;
    let paper_titles = string_column(batch, "paper_title")?;
    let sections = string_column(batch, "section")?;
    let page_numbers = u32_column(batch, "page_number")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;
    let contents = string_column(batch, "content")?;
    let created_ats = string_column(batch, "created_at")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    (0..batch.num_rows())
        .map(|row| {
            let metadata = ChunkMetadata {
                chunk_id: chunk_ids.value(row).to_string(),
                paper_id: paper_ids.value(row).to_string(),
                paper_title: paper_titles.value(row).to_string(),
                section: sections.value(row).parse()?,
                page_number: page_numbers.value(row),
                chunk_index: chunk_indices.value(row),
                content: contents.value(row).to_string(),
                created_at: created_ats.value(row).to_string(),
            };

            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            Ok(RelevantChunk::from((metadata, distance)))
        })
        .collect()
}
