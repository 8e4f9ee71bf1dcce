//! In-process reference implementation of the store ports.
//!
//! Backs the server when no external database is wired and every test.
//! All maps live behind `tokio::sync::RwLock`; no lock is held across a
//! suspension point that leaves this module.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::error::PipelineError;
use crate::core::types::{
    Document, DocumentChunk, DocumentStatus, JobPatch, KnowledgeBase, ScrapeJob,
};

use super::{ChunkMatch, DocStore, VectorStore};

#[derive(Debug, Default, Clone)]
struct UserRecord {
    admin: bool,
    verified: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<String, ScrapeJob>>,
    documents: RwLock<HashMap<String, Document>>,
    knowledge_bases: RwLock<HashMap<String, KnowledgeBase>>,
    agents_using: RwLock<HashMap<String, usize>>,
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Test/ops convenience: register a user so operator commands have
    /// something to act on.
    pub async fn seed_user(&self, email: &str) {
        self.users
            .write()
            .await
            .insert(email.to_string(), UserRecord::default());
    }

    pub async fn seed_agents_using(&self, knowledge_base_id: &str, count: usize) {
        self.agents_using
            .write()
            .await
            .insert(knowledge_base_id.to_string(), count);
    }

    #[cfg(test)]
    async fn user(&self, email: &str) -> Option<UserRecord> {
        self.users.read().await.get(email).cloned()
    }
}

#[async_trait]
impl DocStore for MemoryStore {
    async fn create_job(&self, job: ScrapeJob) -> Result<ScrapeJob, PipelineError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(PipelineError::Conflict(format!("job {} exists", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn update_job(&self, id: &str, patch: JobPatch) -> Result<ScrapeJob, PipelineError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(format!("job {id}")))?;

        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(urls) = patch.discovered_urls {
            job.discovered_urls = urls;
        }
        if let Some(urls) = patch.selected_urls {
            job.selected_urls = urls;
        }
        if let Some(total) = patch.total_urls {
            // Progress never regresses, whatever order writers land in.
            job.total_urls = job.total_urls.max(total);
        }
        if let Some(urls) = patch.scraped_urls {
            job.scraped_urls = urls;
        }
        if let Some(count) = patch.scraped_count {
            job.scraped_count = job.scraped_count.max(count);
        }
        if let Some(msg) = patch.error_message {
            job.error_message = Some(msg);
        }
        if let Some(at) = patch.completed_at {
            job.completed_at = Some(at);
        }
        Ok(job.clone())
    }

    async fn find_job(&self, id: &str) -> Result<Option<ScrapeJob>, PipelineError> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn list_jobs(&self, knowledge_base_id: &str) -> Result<Vec<ScrapeJob>, PipelineError> {
        let mut jobs: Vec<ScrapeJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.knowledge_base_id == knowledge_base_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn create_document(&self, doc: Document) -> Result<Document, PipelineError> {
        let mut documents = self.documents.write().await;
        if let Some(source) = &doc.source_url {
            let duplicate = documents.values().any(|d| {
                d.knowledge_base_id == doc.knowledge_base_id
                    && d.source_url.as_deref() == Some(source.as_str())
            });
            if duplicate {
                return Err(PipelineError::Conflict(format!(
                    "document for {source} already exists in knowledge base {}",
                    doc.knowledge_base_id
                )));
            }
        }
        documents.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        chunk_count: usize,
        error_message: Option<String>,
    ) -> Result<(), PipelineError> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(format!("document {id}")))?;
        doc.status = status;
        doc.chunk_count = chunk_count;
        doc.error_message = error_message;
        Ok(())
    }

    async fn find_document(&self, id: &str) -> Result<Option<Document>, PipelineError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn find_document_by_source(
        &self,
        knowledge_base_id: &str,
        source_url: &str,
    ) -> Result<Option<Document>, PipelineError> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .find(|d| {
                d.knowledge_base_id == knowledge_base_id
                    && d.source_url.as_deref() == Some(source_url)
            })
            .cloned())
    }

    async fn list_documents(
        &self,
        knowledge_base_id: &str,
    ) -> Result<Vec<Document>, PipelineError> {
        let mut docs: Vec<Document> = self
            .documents
            .read()
            .await
            .values()
            .filter(|d| d.knowledge_base_id == knowledge_base_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(docs)
    }

    async fn delete_document(&self, id: &str) -> Result<(), PipelineError> {
        self.documents
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PipelineError::NotFound(format!("document {id}")))
    }

    async fn create_knowledge_base(
        &self,
        kb: KnowledgeBase,
    ) -> Result<KnowledgeBase, PipelineError> {
        if kb.chunk_size == 0 {
            return Err(PipelineError::Conflict("chunk_size must be > 0".into()));
        }
        if kb.chunk_overlap >= kb.chunk_size {
            return Err(PipelineError::Conflict(
                "chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        self.knowledge_bases
            .write()
            .await
            .insert(kb.id.clone(), kb.clone());
        Ok(kb)
    }

    async fn find_knowledge_base(
        &self,
        id: &str,
    ) -> Result<Option<KnowledgeBase>, PipelineError> {
        Ok(self
            .knowledge_bases
            .read()
            .await
            .get(id)
            .filter(|kb| kb.deleted_at.is_none())
            .cloned())
    }

    async fn count_agents_using(&self, knowledge_base_id: &str) -> Result<usize, PipelineError> {
        Ok(*self
            .agents_using
            .read()
            .await
            .get(knowledge_base_id)
            .unwrap_or(&0))
    }

    async fn grant_admin(&self, email: &str) -> Result<bool, PipelineError> {
        let mut users = self.users.write().await;
        match users.get_mut(email) {
            Some(user) => {
                user.admin = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_users_verified(&self) -> Result<usize, PipelineError> {
        let mut users = self.users.write().await;
        let mut flipped = 0;
        for user in users.values_mut() {
            if !user.verified {
                user.verified = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn truncate_all(&self) -> Result<(), PipelineError> {
        self.jobs.write().await.clear();
        self.documents.write().await.clear();
        self.knowledge_bases.write().await.clear();
        self.agents_using.write().await.clear();
        self.users.write().await.clear();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory vector index
// ─────────────────────────────────────────────────────────────────────────────

struct StoredChunk {
    knowledge_base_id: String,
    chunk: DocumentChunk,
}

/// Brute-force cosine index. Fine for tests and small corpora; production
/// uses the LanceDB implementation.
pub struct MemoryVectorStore {
    dimension: usize,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl MemoryVectorStore {
    pub fn new(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            dimension,
            chunks: RwLock::new(Vec::new()),
        })
    }

    pub async fn chunk_count_for(&self, document_id: &str) -> usize {
        self.chunks
            .read()
            .await
            .iter()
            .filter(|c| c.chunk.document_id == document_id)
            .count()
    }
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn insert_chunks(
        &self,
        knowledge_base_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<(), PipelineError> {
        for c in chunks {
            if c.embedding.len() != self.dimension {
                return Err(PipelineError::Storage(format!(
                    "embedding dimension {} does not match index dimension {}",
                    c.embedding.len(),
                    self.dimension
                )));
            }
        }
        let mut store = self.chunks.write().await;
        for c in chunks {
            store.push(StoredChunk {
                knowledge_base_id: knowledge_base_id.to_string(),
                chunk: c.clone(),
            });
        }
        Ok(())
    }

    async fn delete_chunks_by_document(&self, document_id: &str) -> Result<(), PipelineError> {
        self.chunks
            .write()
            .await
            .retain(|c| c.chunk.document_id != document_id);
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
        if allowed_documents.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.chunks.read().await;
        let mut matches: Vec<ChunkMatch> = store
            .iter()
            .filter(|c| c.knowledge_base_id == knowledge_base_id)
            .filter(|c| allowed_documents.iter().any(|d| d == &c.chunk.document_id))
            .map(|c| ChunkMatch {
                chunk_id: c.chunk.id.clone(),
                document_id: c.chunk.document_id.clone(),
                chunk_index: c.chunk.chunk_index,
                content: c.chunk.content.clone(),
                distance: cosine_distance(query, &c.chunk.embedding),
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        matches.truncate(limit);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::JobStatus;
    use chrono::Utc;

    fn kb(id: &str) -> KnowledgeBase {
        KnowledgeBase {
            id: id.into(),
            workspace_id: "ws".into(),
            name: "test".into(),
            embedding_model: "fake".into(),
            chunk_size: 500,
            chunk_overlap: 100,
            deleted_at: None,
        }
    }

    fn chunk_with(document_id: &str, index: usize, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id: format!("{document_id}-{index}"),
            document_id: document_id.into(),
            chunk_index: index,
            content: format!("chunk {index}"),
            start_char: 0,
            end_char: 7,
            embedding,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn duplicate_source_url_is_a_conflict() {
        let store = MemoryStore::new();
        let a = Document::new("kb".into(), "A".into(), "x".into(), Some("https://e.com/p".into()));
        store.create_document(a).await.unwrap();
        let b = Document::new("kb".into(), "B".into(), "y".into(), Some("https://e.com/p".into()));
        let err = store.create_document(b).await.unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
        // Different knowledge base is fine.
        let c = Document::new("kb2".into(), "C".into(), "z".into(), Some("https://e.com/p".into()));
        store.create_document(c).await.unwrap();
    }

    #[tokio::test]
    async fn soft_deleted_knowledge_base_is_invisible() {
        let store = MemoryStore::new();
        let mut k = kb("kb-gone");
        k.deleted_at = Some(Utc::now());
        store
            .knowledge_bases
            .write()
            .await
            .insert(k.id.clone(), k);
        assert!(store.find_knowledge_base("kb-gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn progress_fields_never_regress() {
        let store = MemoryStore::new();
        let mut job = ScrapeJob::new("https://e.com".into(), "kb".into(), "u".into(), 0);
        job.scraped_count = 5;
        job.total_urls = 20;
        let job = store.create_job(job).await.unwrap();

        let updated = store
            .update_job(
                &job.id,
                JobPatch {
                    scraped_count: Some(3),
                    total_urls: Some(10),
                    status: Some(JobStatus::InProgress),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.scraped_count, 5);
        assert_eq!(updated.total_urls, 20);
        assert_eq!(updated.status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn cosine_search_orders_by_distance_then_ties() {
        let vectors = MemoryVectorStore::new(2);
        let allowed = vec!["doc-a".to_string(), "doc-b".to_string()];
        vectors
            .insert_chunks(
                "kb",
                &[
                    chunk_with("doc-b", 0, vec![1.0, 0.0]), // exact match, tie on distance
                    chunk_with("doc-a", 0, vec![1.0, 0.0]), // exact match, tie on distance
                    chunk_with("doc-a", 1, vec![0.0, 1.0]), // orthogonal
                    chunk_with("doc-a", 2, vec![0.7, 0.7]), // in between
                ],
            )
            .await
            .unwrap();

        let hits = vectors
            .nearest_by_cosine("kb", &[1.0, 0.0], 10, &allowed)
            .await
            .unwrap();
        assert_eq!(hits.len(), 4);
        // Ties broken by chunk_index then document_id.
        assert_eq!(hits[0].document_id, "doc-a");
        assert_eq!(hits[1].document_id, "doc-b");
        assert!(hits[0].distance <= hits[2].distance);
        assert_eq!(hits[3].chunk_index, 1);
        for h in &hits {
            let score = 1.0 - h.distance;
            assert!((-1.0..=1.0).contains(&score));
        }
    }

    #[tokio::test]
    async fn search_respects_allowed_documents() {
        let vectors = MemoryVectorStore::new(2);
        vectors
            .insert_chunks("kb", &[chunk_with("doc-a", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        let hits = vectors
            .nearest_by_cosine("kb", &[1.0, 0.0], 10, &["doc-other".to_string()])
            .await
            .unwrap();
        assert!(hits.is_empty());
        let none = vectors
            .nearest_by_cosine("kb", &[1.0, 0.0], 10, &[])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let vectors = MemoryVectorStore::new(3);
        let err = vectors
            .insert_chunks("kb", &[chunk_with("doc-a", 0, vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        let err = vectors
            .nearest_by_cosine("kb", &[1.0], 5, &["doc-a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }

    #[tokio::test]
    async fn operator_commands() {
        let store = MemoryStore::new();
        store.seed_user("a@example.com").await;
        store.seed_user("b@example.com").await;

        assert!(store.grant_admin("a@example.com").await.unwrap());
        assert!(!store.grant_admin("missing@example.com").await.unwrap());
        assert!(store.user("a@example.com").await.unwrap().admin);

        assert_eq!(store.mark_all_users_verified().await.unwrap(), 2);
        assert_eq!(store.mark_all_users_verified().await.unwrap(), 0);

        store.create_knowledge_base(kb("kb")).await.unwrap();
        store.seed_agents_using("kb", 3).await;
        assert_eq!(store.count_agents_using("kb").await.unwrap(), 3);
        assert_eq!(store.count_agents_using("kb-unknown").await.unwrap(), 0);

        store.truncate_all().await.unwrap();
        assert!(store.find_knowledge_base("kb").await.unwrap().is_none());
        assert_eq!(store.count_agents_using("kb").await.unwrap(), 0);
        assert!(store.user("a@example.com").await.is_none());
    }

    #[tokio::test]
    async fn knowledge_base_chunk_config_is_validated() {
        let store = MemoryStore::new();
        let mut bad = kb("kb-bad");
        bad.chunk_size = 0;
        assert!(store.create_knowledge_base(bad).await.is_err());
        let mut bad = kb("kb-bad2");
        bad.chunk_overlap = 500;
        assert!(store.create_knowledge_base(bad).await.is_err());
    }
}
