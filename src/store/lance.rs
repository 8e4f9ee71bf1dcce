//! LanceDB-backed chunk vector index.
//!
//! One table holds every chunk row across knowledge bases; queries filter by
//! `kb_id` and the caller's allowed document set, and rank by cosine
//! distance. The embedding column is a fixed-size float32 list whose width
//! is pinned at connect time — a knowledge base can never mix vector
//! dimensions in this index.

use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;

use crate::core::error::PipelineError;
use crate::core::types::DocumentChunk;

use super::{ChunkMatch, VectorStore};

const TABLE_NAME: &str = "kb_chunks";

pub struct LanceVectorStore {
    table: Table,
    dimension: usize,
}

impl LanceVectorStore {
    /// Connect to (or create) the chunk table at `uri`.
    pub async fn connect(uri: &str, dimension: usize) -> Result<Self, PipelineError> {
        tracing::info!("Opening chunk vector index at: {} (dim: {})", uri, dimension);

        let db = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| PipelineError::Storage(format!("LanceDB connect failed: {e}")))?;

        let schema = Arc::new(Self::chunk_schema(dimension)?);
        let table = match db.open_table(TABLE_NAME).execute().await {
            Ok(table) => table,
            Err(lancedb::Error::TableNotFound { .. }) => {
                tracing::info!("Creating LanceDB table '{}'", TABLE_NAME);
                db.create_empty_table(TABLE_NAME, schema.clone())
                    .execute()
                    .await
                    .map_err(|e| {
                        PipelineError::Storage(format!("LanceDB table create failed: {e}"))
                    })?
            }
            Err(e) => {
                return Err(PipelineError::Storage(format!(
                    "LanceDB table open failed: {e}"
                )))
            }
        };

        // Best-effort vector index; flat search still works without one.
        if let Err(e) = table
            .create_index(&["vector"], lancedb::index::Index::Auto)
            .execute()
            .await
        {
            tracing::debug!("LanceDB create_index skipped/failed: {}", e);
        }

        Ok(Self { table, dimension })
    }

    fn chunk_schema(dimension: usize) -> Result<Schema, PipelineError> {
        let vector_len: i32 = dimension
            .try_into()
            .map_err(|_| PipelineError::Storage("embedding dimension too large".into()))?;

        Ok(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("kb_id", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int64, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("start_char", DataType::Int64, false),
            Field::new("end_char", DataType::Int64, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    vector_len,
                ),
                true,
            ),
        ]))
    }

    fn chunks_to_batch(
        &self,
        knowledge_base_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<RecordBatch, PipelineError> {
        let schema = Arc::new(Self::chunk_schema(self.dimension)?);
        let vector_len = self.dimension as i32;

        let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            chunks.iter().map(|c| {
                Some(c.embedding.iter().map(|v| Some(*v)).collect::<Vec<_>>())
            }),
            vector_len,
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|c| c.id.as_str()),
                )),
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|_| knowledge_base_id),
                )),
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|c| c.document_id.as_str()),
                )),
                Arc::new(Int64Array::from_iter_values(
                    chunks.iter().map(|c| c.chunk_index as i64),
                )),
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|c| c.content.as_str()),
                )),
                Arc::new(Int64Array::from_iter_values(
                    chunks.iter().map(|c| c.start_char as i64),
                )),
                Arc::new(Int64Array::from_iter_values(
                    chunks.iter().map(|c| c.end_char as i64),
                )),
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|c| c.metadata.to_string()),
                )),
                Arc::new(vectors),
            ],
        )
        .map_err(|e| PipelineError::Storage(format!("failed to build Arrow batch: {e}")))
    }

    fn batch_to_matches(batch: &RecordBatch) -> Result<Vec<ChunkMatch>, PipelineError> {
        let id_col = string_column(batch, "id")?;
        let document_col = string_column(batch, "document_id")?;
        let content_col = string_column(batch, "content")?;
        let index_col = batch
            .column_by_name("chunk_index")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| PipelineError::Storage("missing column: chunk_index".into()))?;
        let distance_col = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let mut out = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let distance = distance_col
                .map(|d| {
                    let v = d.value(row);
                    if v.is_nan() {
                        1.0
                    } else {
                        v
                    }
                })
                .unwrap_or(1.0);
            out.push(ChunkMatch {
                chunk_id: id_col.value(row).to_string(),
                document_id: document_col.value(row).to_string(),
                chunk_index: index_col.value(row).max(0) as usize,
                content: content_col.value(row).to_string(),
                distance,
            });
        }
        Ok(out)
    }
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, PipelineError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| PipelineError::Storage(format!("missing column: {name}")))
}

/// Escape a value for a LanceDB `only_if`/`delete` string literal.
fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn insert_chunks(
        &self,
        knowledge_base_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<(), PipelineError> {
        if chunks.is_empty() {
            return Ok(());
        }
        for c in chunks {
            if c.embedding.len() != self.dimension {
                return Err(PipelineError::Storage(format!(
                    "embedding dimension {} does not match index dimension {}",
                    c.embedding.len(),
                    self.dimension
                )));
            }
        }

        let batch = self.chunks_to_batch(knowledge_base_id, chunks)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);

        self.table
            .add(batches)
            .execute()
            .await
            .map_err(|e| PipelineError::Storage(format!("LanceDB insert failed: {e}")))?;
        Ok(())
    }

    async fn delete_chunks_by_document(&self, document_id: &str) -> Result<(), PipelineError> {
        self.table
            .delete(&format!("document_id = {}", sql_quote(document_id)))
            .await
            .map_err(|e| PipelineError::Storage(format!("LanceDB delete failed: {e}")))?;
        Ok(())
    }

    async fn nearest_by_cosine(
        &self,
        knowledge_base_id: &str,
        query: &[f32],
        limit: usize,
        allowed_documents: &[String],
    ) -> Result<Vec<ChunkMatch>, PipelineError> {
        if query.len() != self.dimension {
            return Err(PipelineError::Storage(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }
        if allowed_documents.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let doc_list = allowed_documents
            .iter()
            .map(|d| sql_quote(d))
            .collect::<Vec<_>>()
            .join(", ");
        let filter = format!(
            "kb_id = {} AND document_id IN ({})",
            sql_quote(knowledge_base_id),
            doc_list
        );

        let stream = self
            .table
            .query()
            .nearest_to(query)
            .map_err(|e| PipelineError::Storage(format!("vector query build failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .only_if(filter)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| PipelineError::Storage(format!("vector query failed: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| PipelineError::Storage(format!("vector query read failed: {e}")))?;

        let mut matches = Vec::new();
        for batch in &batches {
            matches.extend(Self::batch_to_matches(batch)?);
        }
        Ok(matches)
    }
}
