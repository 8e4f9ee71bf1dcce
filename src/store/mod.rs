//! External ports of the pipeline: the job/document store, the chunk vector
//! store, and the embedding service.
//!
//! Workers only ever talk to these traits; production wiring and test fakes
//! swap freely behind them.

pub mod embedder;
pub mod lance;
pub mod memory;

use async_trait::async_trait;

use crate::core::error::PipelineError;
use crate::core::types::{
    Document, DocumentChunk, DocumentStatus, JobPatch, KnowledgeBase, ScrapeJob,
};

/// Job, document, and knowledge-base persistence.
///
/// Soft-delete discipline: every knowledge-base read filters
/// `deleted_at IS NULL`.
#[async_trait]
pub trait DocStore: Send + Sync {
    async fn create_job(&self, job: ScrapeJob) -> Result<ScrapeJob, PipelineError>;
    /// Update-by-id with last-writer-wins patch semantics. Progress fields
    /// (`scraped_count`, `total_urls`) never regress.
    async fn update_job(&self, id: &str, patch: JobPatch) -> Result<ScrapeJob, PipelineError>;
    async fn find_job(&self, id: &str) -> Result<Option<ScrapeJob>, PipelineError>;
    async fn list_jobs(&self, knowledge_base_id: &str) -> Result<Vec<ScrapeJob>, PipelineError>;

    /// Fails with `Conflict` when the knowledge base already has a document
    /// for the same `source_url`.
    async fn create_document(&self, doc: Document) -> Result<Document, PipelineError>;
    async fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        chunk_count: usize,
        error_message: Option<String>,
    ) -> Result<(), PipelineError>;
    async fn find_document(&self, id: &str) -> Result<Option<Document>, PipelineError>;
    async fn find_document_by_source(
        &self,
        knowledge_base_id: &str,
        source_url: &str,
    ) -> Result<Option<Document>, PipelineError>;
    async fn list_documents(
        &self,
        knowledge_base_id: &str,
    ) -> Result<Vec<Document>, PipelineError>;
    /// Removes the document row only; callers delete the chunks first via
    /// the vector store (see `ingest::delete_document`).
    async fn delete_document(&self, id: &str) -> Result<(), PipelineError>;

    async fn create_knowledge_base(
        &self,
        kb: KnowledgeBase,
    ) -> Result<KnowledgeBase, PipelineError>;
    async fn find_knowledge_base(
        &self,
        id: &str,
    ) -> Result<Option<KnowledgeBase>, PipelineError>;
    async fn count_agents_using(&self, knowledge_base_id: &str) -> Result<usize, PipelineError>;

    // Operator commands (peripheral surface).
    async fn grant_admin(&self, email: &str) -> Result<bool, PipelineError>;
    async fn mark_all_users_verified(&self) -> Result<usize, PipelineError>;
    async fn truncate_all(&self) -> Result<(), PipelineError>;
}

/// One nearest-neighbor match from the vector index.
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub content: String,
    /// Cosine distance, `1 − similarity`.
    pub distance: f32,
}

/// Chunk persistence plus cosine nearest-neighbor search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Fixed embedding dimension `D` of this index. Inserts and queries with
    /// any other dimension are storage errors.
    fn dimension(&self) -> usize;

    async fn insert_chunks(
        &self,
        knowledge_base_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<(), PipelineError>;

    async fn delete_chunks_by_document(&self, document_id: &str) -> Result<(), PipelineError>;

    /// Nearest chunks by cosine distance within one knowledge base,
    /// restricted to `allowed_documents` (the caller passes the COMPLETED
    /// document set — that is how the status restriction crosses this port).
    async fn nearest_by_cosine(
        &self,
        knowledge_base_id: &str,
        query: &[f32],
        limit: usize,
        allowed_documents: &[String],
    ) -> Result<Vec<ChunkMatch>, PipelineError>;
}

/// Text-to-vector embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, PipelineError>;
}
