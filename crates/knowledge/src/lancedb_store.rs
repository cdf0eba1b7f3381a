//! LanceDB-backed document collections.
//!
//! All collections of a workspace live in one LanceDB database directory
//! (`.agri/collections/`), one table per collection.

use crate::store::VectorStore;
use crate::types::{CollectionStats, Document, DocumentMetadata, RegionTag};
use agri_core::{AppError, AppResult};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Column LanceDB appends to vector query results.
const DISTANCE_COLUMN: &str = "_distance";

/// One collection stored as a LanceDB table.
pub struct LanceDbStore {
    name: String,
    table: Table,
    embedding_dim: usize,
}

async fn connect(db_path: &Path) -> AppResult<Connection> {
    std::fs::create_dir_all(db_path).map_err(|e| {
        AppError::Knowledge(format!("Failed to create collections directory: {}", e))
    })?;

    let uri = db_path.to_string_lossy().to_string();
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to connect to LanceDB: {}", e)))
}

impl LanceDbStore {
    /// Open a collection, creating an empty table if it does not exist.
    ///
    /// # Arguments
    /// * `db_path` - LanceDB database directory
    /// * `collection` - Table name (e.g. "golden", "pops")
    /// * `embedding_dim` - Dimension of embedding vectors
    pub async fn open(db_path: &Path, collection: &str, embedding_dim: usize) -> AppResult<Self> {
        let conn = connect(db_path).await?;

        let table_names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to list tables: {}", e)))?;

        let table = if table_names.iter().any(|t| t == collection) {
            conn.open_table(collection)
                .execute()
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to open table: {}", e)))?
        } else {
            let schema = Self::create_schema(embedding_dim);
            let empty_batch = RecordBatch::new_empty(schema.clone());

            conn.create_table(
                collection,
                RecordBatchIterator::new(vec![Ok(empty_batch)], schema),
            )
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to create table: {}", e)))?
        };

        tracing::debug!("Opened collection '{}' at {:?}", collection, db_path);

        Ok(Self {
            name: collection.to_string(),
            table,
            embedding_dim,
        })
    }

    /// Row counts of every collection in a database directory.
    pub async fn list_collections(db_path: &Path) -> AppResult<Vec<CollectionStats>> {
        if !db_path.exists() {
            return Ok(Vec::new());
        }

        let conn = connect(db_path).await?;
        let names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to list tables: {}", e)))?;

        let mut stats = Vec::with_capacity(names.len());
        for name in names {
            let table = conn
                .open_table(&name)
                .execute()
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to open table: {}", e)))?;
            let documents = table
                .count_rows(None)
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to count rows: {}", e)))?;
            stats.push(CollectionStats { name, documents });
        }

        Ok(stats)
    }

    fn create_schema(embedding_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            // Canonical label, and its lowercase form for filtering
            Field::new("region", DataType::Utf8, false),
            Field::new("region_key", DataType::Utf8, false),
            Field::new("topic", DataType::Utf8, true),
            // Remaining source metadata as JSON
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    embedding_dim as i32,
                ),
                false,
            ),
        ]))
    }

    /// Convert documents to a single Arrow RecordBatch.
    fn documents_to_batch(&self, documents: &[Document]) -> AppResult<RecordBatch> {
        let schema = Self::create_schema(self.embedding_dim);

        let mut flat_embeddings = Vec::with_capacity(documents.len() * self.embedding_dim);
        let mut extras = Vec::with_capacity(documents.len());
        let mut region_keys = Vec::with_capacity(documents.len());

        for doc in documents {
            let embedding = doc.embedding.as_ref().ok_or_else(|| {
                AppError::Knowledge(format!("Document {} missing embedding", doc.id))
            })?;

            if embedding.len() != self.embedding_dim {
                return Err(AppError::Knowledge(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.embedding_dim,
                    embedding.len()
                )));
            }

            flat_embeddings.extend_from_slice(embedding);
            extras.push(serde_json::to_string(&doc.metadata.extra)?);
            region_keys.push(doc.metadata.region.key());
        }

        let ids = StringArray::from(documents.iter().map(|d| d.id.as_str()).collect::<Vec<_>>());
        let contents = StringArray::from(
            documents
                .iter()
                .map(|d| d.content.as_str())
                .collect::<Vec<_>>(),
        );
        let regions = StringArray::from(
            documents
                .iter()
                .map(|d| d.metadata.region.as_str())
                .collect::<Vec<_>>(),
        );
        let region_keys = StringArray::from(region_keys);
        let topics = StringArray::from(
            documents
                .iter()
                .map(|d| d.metadata.topic.as_deref())
                .collect::<Vec<_>>(),
        );
        let metadata = StringArray::from(extras);

        let embeddings = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.embedding_dim as i32,
            Arc::new(Float32Array::from(flat_embeddings)),
            None,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to build embedding column: {}", e)))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(ids),
                Arc::new(contents),
                Arc::new(regions),
                Arc::new(region_keys),
                Arc::new(topics),
                Arc::new(metadata),
                Arc::new(embeddings),
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create RecordBatch: {}", e)))
    }

    /// Convert query result rows back into documents with distances.
    fn batch_to_documents(batch: &RecordBatch) -> AppResult<Vec<(Document, f32)>> {
        let ids = string_column(batch, "id")?;
        let contents = string_column(batch, "content")?;
        let regions = string_column(batch, "region")?;
        let topics = string_column(batch, "topic")?;
        let metadata = string_column(batch, "metadata")?;

        let embeddings = batch
            .column_by_name("embedding")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());

        let distances = batch
            .column_by_name(DISTANCE_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let mut documents = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let extra: BTreeMap<String, serde_json::Value> =
                serde_json::from_str(metadata.value(row)).unwrap_or_else(|e| {
                    tracing::warn!("Unreadable metadata for row {}: {}", row, e);
                    BTreeMap::new()
                });

            let topic = (!topics.is_null(row)).then(|| topics.value(row).to_string());

            let embedding = embeddings.and_then(|list| {
                let values = list.value(row);
                values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .map(|v| v.values().to_vec())
            });

            let distance = distances.map(|d| d.value(row)).unwrap_or(0.0);

            documents.push((
                Document {
                    id: ids.value(row).to_string(),
                    content: contents.value(row).to_string(),
                    metadata: DocumentMetadata {
                        region: RegionTag::parse(regions.value(row)),
                        topic,
                        extra,
                    },
                    embedding,
                },
                distance,
            ));
        }

        Ok(documents)
    }

    /// Insert documents, replacing any with the same id.
    pub async fn add_documents(&self, documents: &[Document]) -> AppResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let batch = self.documents_to_batch(documents)?;

        let id_list = documents
            .iter()
            .map(|d| format!("'{}'", d.id))
            .collect::<Vec<_>>()
            .join(", ");
        self.table
            .delete(&format!("id IN ({})", id_list))
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to replace documents: {}", e)))?;

        let schema = batch.schema();
        self.table
            .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to add documents: {}", e)))?;

        tracing::debug!("Wrote {} documents to '{}'", documents.len(), self.name);
        Ok(documents.len())
    }

    /// Number of documents in the collection.
    pub async fn count(&self) -> AppResult<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to count rows: {}", e)))
    }

    /// Remove every document from the collection.
    pub async fn reset(&self) -> AppResult<()> {
        if self.count().await? > 0 {
            self.table
                .delete("id IS NOT NULL")
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to reset collection: {}", e)))?;
        }
        tracing::info!("Reset collection '{}'", self.name);
        Ok(())
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::Knowledge(format!("Invalid {} column", name)))
}

/// SQL string literal with single quotes escaped.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait::async_trait]
impl VectorStore for LanceDbStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn similarity_search_with_score(
        &self,
        query_embedding: &[f32],
        k: usize,
        region_filter: Option<&str>,
    ) -> AppResult<Vec<(Document, f32)>> {
        if query_embedding.len() != self.embedding_dim {
            return Err(AppError::Knowledge(format!(
                "Query embedding dimension mismatch: expected {}, got {}",
                self.embedding_dim,
                query_embedding.len()
            )));
        }

        let mut query = self
            .table
            .query()
            .nearest_to(query_embedding.to_vec())
            .map_err(|e| AppError::Knowledge(format!("Failed to create query: {}", e)))?
            .limit(k);

        if let Some(region) = region_filter {
            let key = RegionTag::parse(region).key();
            query = query.only_if(format!("region_key = {}", sql_literal(&key)));
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to execute search: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to collect results: {}", e)))?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(Self::batch_to_documents(batch)?);
        }

        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        tracing::debug!(
            collection = %self.name,
            region = region_filter.unwrap_or("-"),
            "Retrieved {} candidates (requested top-{})",
            results.len(),
            k
        );

        Ok(results)
    }
}
