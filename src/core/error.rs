use thiserror::Error;

/// Failure taxonomy for the ingestion pipeline.
///
/// The variant decides the blast radius, not the message: a
/// [`PipelineError::TransientNetwork`] is retried and then skipped, an
/// [`PipelineError::Embedding`] fails the one document being processed, and
/// only [`PipelineError::BrowserUnavailable`] during discovery degrades the
/// enclosing job (to `PENDING` with a base-URL-only fallback, never straight
/// to `FAILED`).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A single URL failed to load. Retryable within a scrape; skipped with a
    /// warning once retries are exhausted.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// The URL classifier rejected the page. Not a failure — the URL is
    /// skipped silently.
    #[error("url rejected by content classifier: {0}")]
    ClassifierReject(String),

    /// Extraction produced too little text to be worth storing. The URL is
    /// skipped without a document being written.
    #[error("extraction yielded no usable content for {0}")]
    EmptyExtract(String),

    /// The embedding service failed, or returned a vector of the wrong
    /// dimension. Fails the enclosing document.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The browser could not be launched, or the underlying process died and
    /// restart attempts are exhausted.
    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    /// A job/document/vector store operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl PipelineError {
    /// Whether a scrape attempt that hit this error should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::TransientNetwork(_))
    }
}
