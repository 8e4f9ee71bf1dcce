use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Jobs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Discovering,
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A website-to-knowledge-base ingestion job.
///
/// Mutated only through the state machine in [`crate::jobs`]; workers never
/// write fields ad hoc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: String,
    pub base_url: String,
    pub knowledge_base_id: String,
    pub user_id: String,
    pub status: JobStatus,
    /// 0 means "use the default crawl cap".
    pub max_pages: usize,
    /// Candidate content URLs found so far. Set semantics; insertion order.
    pub discovered_urls: Vec<String>,
    /// Operator-chosen subset of `discovered_urls` to ingest.
    pub selected_urls: Vec<String>,
    pub total_urls: usize,
    /// URLs that produced a completed document.
    pub scraped_urls: Vec<String>,
    pub scraped_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScrapeJob {
    pub fn new(base_url: String, knowledge_base_id: String, user_id: String, max_pages: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            base_url,
            knowledge_base_id,
            user_id,
            status: JobStatus::Discovering,
            max_pages,
            discovered_urls: Vec::new(),
            selected_urls: Vec::new(),
            total_urls: 0,
            scraped_urls: Vec::new(),
            scraped_count: 0,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Partial update for `update_job`. `None` fields are left untouched.
///
/// Progress fields are last-writer-wins but monotonic: the store clamps them
/// so `scraped_count` and `total_urls` never regress.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub discovered_urls: Option<Vec<String>>,
    pub selected_urls: Option<Vec<String>>,
    pub total_urls: Option<usize>,
    pub scraped_urls: Option<Vec<String>>,
    pub scraped_count: Option<usize>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge bases & documents
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub knowledge_base_id: String,
    pub title: String,
    pub content: String,
    /// Unique per knowledge base when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub status: DocumentStatus,
    pub chunk_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(knowledge_base_id: String, title: String, content: String, source_url: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            knowledge_base_id,
            title,
            content,
            source_url,
            status: DocumentStatus::Processing,
            chunk_count: 0,
            error_message: None,
            metadata: serde_json::Map::new(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// One embedded slice of a document, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub content: String,
    /// Char offsets into the parent document's content.
    pub start_char: usize,
    pub end_char: usize,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub content: String,
    /// Cosine similarity, `1 − distance`.
    pub score: f32,
    pub document_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP surface
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub base_url: String,
    pub knowledge_base_id: String,
    pub user_id: String,
    #[serde(default)]
    pub max_pages: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateKnowledgeBaseRequest {
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectUrlsRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
