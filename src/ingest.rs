//! Ingestion pipeline: scrape → extract → chunk → embed → persist.
//!
//! Each selected URL is processed independently. Per-URL failures taint at
//! most one document; the job only fails when every selected URL does.
//! Classifier rejections and empty extractions are skips, not failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::chunker;
use crate::classify::content_type_ok;
use crate::core::config::{EMBED_CONCURRENCY, INGEST_NAV_TIMEOUT, SCRAPE_RETRIES};
use crate::core::error::PipelineError;
use crate::core::types::{Document, DocumentChunk, DocumentStatus, JobStatus, KnowledgeBase};
use crate::core::AppState;
use crate::extract::{extract, is_empty_extract};
use crate::jobs::{self, JobEvent};
use crate::scraping::RenderedPage;

/// Ingestion worker for one job. The job must already be `IN_PROGRESS`
/// (the selection endpoint transitions it before spawning this).
pub async fn run_ingestion(state: Arc<AppState>, job_id: String) {
    let job = match state.store.find_job(&job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!("Ingestion worker: job {} vanished", job_id);
            return;
        }
        Err(e) => {
            warn!("Ingestion worker: cannot load job {}: {}", job_id, e);
            return;
        }
    };

    let kb = match state.store.find_knowledge_base(&job.knowledge_base_id).await {
        Ok(Some(kb)) => kb,
        Ok(None) => {
            fail_job(&state, &job_id, "knowledge base is gone").await;
            return;
        }
        Err(e) => {
            fail_job(&state, &job_id, &format!("knowledge base lookup failed: {e}")).await;
            return;
        }
    };

    let selected = job.selected_urls.clone();
    info!(
        "Ingesting {} urls for job {} into knowledge base {}",
        selected.len(),
        job_id,
        kb.id
    );

    let mut scraped = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for url in &selected {
        // Externally cancelled jobs abort between pages.
        if matches!(
            state.store.find_job(&job_id).await,
            Ok(Some(j)) if j.status == JobStatus::Failed
        ) {
            warn!("Job {} cancelled externally; stopping ingestion", job_id);
            return;
        }

        match ingest_url(&state, &kb, url).await {
            Ok(doc) => {
                scraped += 1;
                info!(
                    "Ingested {} as document {} ({} chunks)",
                    url, doc.id, doc.chunk_count
                );
                let event = JobEvent::PageScraped { url: url.clone() };
                if let Err(e) = jobs::advance(&state.store, &job_id, event).await {
                    warn!("Scrape progress write failed for job {}: {}", job_id, e);
                }
            }
            Err(PipelineError::ClassifierReject(_)) => {
                skipped += 1;
                debug!("Skipping non-content url: {}", url);
            }
            Err(PipelineError::EmptyExtract(_)) => {
                skipped += 1;
                info!("Skipping {}: nothing extractable", url);
            }
            Err(e) => {
                failed += 1;
                warn!("Ingestion of {} failed: {}", url, e);
            }
        }
    }

    let outcome = if !selected.is_empty() && failed == selected.len() {
        JobEvent::Failed {
            error: "every selected url failed to ingest".into(),
        }
    } else {
        JobEvent::IngestionComplete
    };

    match jobs::advance(&state.store, &job_id, outcome).await {
        Ok(job) => info!(
            "Job {} is {:?}: {} scraped, {} skipped, {} failed",
            job_id, job.status, scraped, skipped, failed
        ),
        Err(e) => warn!("Could not finalize ingestion for job {}: {}", job_id, e),
    }
}

async fn fail_job(state: &Arc<AppState>, job_id: &str, error: &str) {
    let event = JobEvent::Failed {
        error: error.to_string(),
    };
    if let Err(e) = jobs::advance(&state.store, job_id, event).await {
        warn!("Could not fail job {}: {}", job_id, e);
    }
}

/// Scrape one URL and persist it as a document with embedded chunks.
pub async fn ingest_url(
    state: &Arc<AppState>,
    kb: &KnowledgeBase,
    url: &str,
) -> Result<Document, PipelineError> {
    let rendered = fetch_with_retries(state, url).await?;

    if !content_type_ok(&rendered.content_type) {
        return Err(PipelineError::ClassifierReject(url.to_string()));
    }

    let extracted = extract(&rendered.html);
    if is_empty_extract(&extracted.content) {
        return Err(PipelineError::EmptyExtract(url.to_string()));
    }

    let mut metadata = serde_json::Map::new();
    metadata.insert(
        "description".into(),
        serde_json::Value::String(extracted.description.clone()),
    );
    metadata.insert(
        "extraction".into(),
        serde_json::Value::String(format!("{:?}", extracted.outcome)),
    );

    ingest_content(
        state,
        kb,
        Some(url),
        extracted.title,
        extracted.content,
        metadata,
    )
    .await
}

/// Chunk, embed, and persist one document's content.
///
/// Re-ingesting a `source_url` that already has a document replaces it under
/// the same document id — stale chunks are removed first, so at most one
/// document per source URL ever exists.
pub async fn ingest_content(
    state: &Arc<AppState>,
    kb: &KnowledgeBase,
    source_url: Option<&str>,
    title: String,
    content: String,
    metadata: serde_json::Map<String, serde_json::Value>,
) -> Result<Document, PipelineError> {
    let existing = match source_url {
        Some(url) => state.store.find_document_by_source(&kb.id, url).await?,
        None => None,
    };
    if let Some(old) = &existing {
        state.vectors.delete_chunks_by_document(&old.id).await?;
        state.store.delete_document(&old.id).await?;
    }

    let mut doc = Document::new(
        kb.id.clone(),
        title,
        content,
        source_url.map(str::to_string),
    );
    if let Some(old) = existing {
        doc.id = old.id;
        doc.tags = old.tags;
    }
    doc.metadata = metadata;
    let mut doc = state.store.create_document(doc).await?;

    match embed_and_store_chunks(state, kb, &doc).await {
        Ok(chunk_count) => {
            state
                .store
                .update_document_status(&doc.id, DocumentStatus::Completed, chunk_count, None)
                .await?;
            doc.status = DocumentStatus::Completed;
            doc.chunk_count = chunk_count;
            Ok(doc)
        }
        Err(e) => {
            let message = e.to_string();
            if let Err(status_err) = state
                .store
                .update_document_status(&doc.id, DocumentStatus::Failed, 0, Some(message.clone()))
                .await
            {
                warn!(
                    "Could not mark document {} failed: {}",
                    doc.id, status_err
                );
            }
            Err(e)
        }
    }
}

/// Chunk the document and embed every chunk. Embedding calls run
/// concurrently; chunk rows keep their window order regardless of which
/// embedding lands first.
async fn embed_and_store_chunks(
    state: &Arc<AppState>,
    kb: &KnowledgeBase,
    doc: &Document,
) -> Result<usize, PipelineError> {
    let pieces = chunker::chunk(&doc.content, kb.chunk_size, kb.chunk_overlap);
    if pieces.is_empty() {
        return Ok(0);
    }

    let results: Vec<Result<(usize, chunker::Chunk, Vec<f32>), PipelineError>> =
        stream::iter(pieces.into_iter().enumerate())
            .map(|(index, piece)| {
                let embedder = state.embedder.clone();
                let model = kb.embedding_model.clone();
                async move {
                    let vector = embedder.embed(&piece.content, &model).await?;
                    Ok((index, piece, vector))
                }
            })
            .buffer_unordered(EMBED_CONCURRENCY)
            .collect()
            .await;

    let mut embedded = Vec::with_capacity(results.len());
    for result in results {
        embedded.push(result?);
    }
    embedded.sort_by_key(|(index, _, _)| *index);

    let expected_dim = state.vectors.dimension();
    let mut rows = Vec::with_capacity(embedded.len());
    for (index, piece, vector) in embedded {
        if vector.len() != expected_dim {
            return Err(PipelineError::Embedding(format!(
                "model {} produced dimension {}, index expects {}",
                kb.embedding_model,
                vector.len(),
                expected_dim
            )));
        }
        let length = piece.content.chars().count();
        rows.push(DocumentChunk {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            chunk_index: index,
            content: piece.content,
            start_char: piece.start_char,
            end_char: piece.end_char,
            embedding: vector,
            metadata: serde_json::json!({ "chunkLength": length }),
        });
    }

    let count = rows.len();
    state.vectors.insert_chunks(&kb.id, &rows).await?;
    Ok(count)
}

/// Delete a document and exactly its chunks — chunks first, so a crash
/// between the two steps never leaves orphaned vectors behind.
pub async fn delete_document(
    state: &Arc<AppState>,
    document_id: &str,
) -> Result<(), PipelineError> {
    state.vectors.delete_chunks_by_document(document_id).await?;
    state.store.delete_document(document_id).await
}

/// Render with the cache warm path and bounded retries.
///
/// Transient navigation failures retry up to [`SCRAPE_RETRIES`] times after
/// the initial attempt; everything else is permanent.
async fn fetch_with_retries(
    state: &Arc<AppState>,
    url: &str,
) -> Result<RenderedPage, PipelineError> {
    if let Some(cached) = state.page_cache.get(url).await {
        debug!("Page cache hit: {}", url);
        return Ok(cached);
    }

    let policy = backoff::ExponentialBackoff {
        initial_interval: std::time::Duration::from_millis(500),
        max_interval: std::time::Duration::from_secs(3),
        max_elapsed_time: Some(std::time::Duration::from_secs(90)),
        ..Default::default()
    };

    let attempts = AtomicUsize::new(0);
    backoff::future::retry(policy, || async {
        match state.renderer.render(url, INGEST_NAV_TIMEOUT).await {
            Ok(page) => Ok(page),
            Err(e) if e.is_transient() => {
                let used = attempts.fetch_add(1, Ordering::SeqCst);
                if used >= SCRAPE_RETRIES {
                    Err(backoff::Error::permanent(e))
                } else {
                    warn!("Retrying {} after transient failure: {}", url, e);
                    Err(backoff::Error::transient(e))
                }
            }
            Err(e) => Err(backoff::Error::permanent(e)),
        }
    })
    .await
}
