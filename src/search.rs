//! Cosine retrieval over a knowledge base's chunks.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::core::error::PipelineError;
use crate::core::types::{DocumentStatus, SearchHit};
use crate::core::AppState;

/// Find the `limit` chunks closest to `query` across all COMPLETED documents
/// of a knowledge base.
///
/// Results are sorted by score descending; ties break by chunk index then
/// document id, so identical queries always return identical orderings.
pub async fn search(
    state: &Arc<AppState>,
    knowledge_base_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchHit>, PipelineError> {
    let kb = state
        .store
        .find_knowledge_base(knowledge_base_id)
        .await?
        .ok_or_else(|| {
            PipelineError::NotFound(format!("knowledge base {knowledge_base_id}"))
        })?;

    let documents = state.store.list_documents(&kb.id).await?;
    let completed: HashMap<String, (String, Option<String>)> = documents
        .into_iter()
        .filter(|d| d.status == DocumentStatus::Completed)
        .map(|d| (d.id, (d.title, d.source_url)))
        .collect();
    if completed.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let query_vector = state.embedder.embed(query, &kb.embedding_model).await?;

    let allowed: Vec<String> = completed.keys().cloned().collect();
    let mut matches = state
        .vectors
        .nearest_by_cosine(&kb.id, &query_vector, limit, &allowed)
        .await?;

    // The store already ranks by distance; re-sort to pin the tie order.
    matches.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    matches.truncate(limit);

    debug!(
        "Search in {} matched {} chunks for {:?}",
        kb.id,
        matches.len(),
        query
    );

    Ok(matches
        .into_iter()
        .map(|m| {
            let (title, source_url) = completed
                .get(&m.document_id)
                .cloned()
                .unwrap_or_else(|| (String::new(), None));
            SearchHit {
                chunk_id: m.chunk_id,
                content: m.content,
                score: 1.0 - m.distance,
                document_title: title,
                source_url,
            }
        })
        .collect())
}
