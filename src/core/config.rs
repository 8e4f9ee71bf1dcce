use std::time::Duration;

// ---------------------------------------------------------------------------
// Heuristic constants
//
// These thresholds shape extraction, chunking, and crawling behavior. They
// are deliberate tuning knobs, kept named and in one place instead of inlined
// at their use sites.
// ---------------------------------------------------------------------------

/// Minimum text length for a selector match to count as the main content.
pub const MAIN_CONTENT_MIN_CHARS: usize = 200;

/// Minimum text-to-markup ratio for the scored candidate fallback. Filters
/// out nav-heavy containers whose markup dwarfs their text.
pub const TEXT_RATIO_MIN: f64 = 0.1;

/// Below this, the main candidate is replaced by joined paragraphs + lists.
pub const FALLBACK_MIN_CHARS: usize = 500;

/// Below this, extraction falls back to the full body text.
pub const BODY_FALLBACK_MIN_CHARS: usize = 100;

/// Hard cap on extracted content length.
pub const CONTENT_CAP_CHARS: usize = 50_000;

/// Extractions shorter than this are treated as empty and skipped.
pub const EMPTY_EXTRACT_CHARS: usize = 20;

/// Paragraphs shorter than this are ignored during structural augmentation.
pub const PARAGRAPH_MIN_CHARS: usize = 30;

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Crawl page cap applied when a job requests `max_pages = 0`.
pub const DEFAULT_MAX_CRAWL_PAGES: usize = 500;

/// Discovery flushes progress to the job store every this many new URLs.
pub const PROGRESS_REPORT_EVERY: usize = 10;

/// How far back from a tentative chunk end the chunker looks for a
/// semantic separator.
pub const SEPARATOR_LOOKBACK_CHARS: usize = 100;

/// Navigation timeout during discovery.
pub const DISCOVERY_NAV_TIMEOUT: Duration = Duration::from_secs(15);

/// Navigation timeout during ingestion scrapes.
pub const INGEST_NAV_TIMEOUT: Duration = Duration::from_secs(20);

/// Settle time for client-side rendering after navigation.
pub const DYNAMIC_CONTENT_WAIT: Duration = Duration::from_secs(3);

/// Settle time after scrolling and clicking load-more controls.
pub const POST_INTERACT_WAIT: Duration = Duration::from_secs(1);

/// Soft cap on concurrent browser tabs across all jobs.
pub const MAX_BROWSER_PAGES: usize = 5;

/// Retries after the initial scrape attempt (3 attempts total).
pub const SCRAPE_RETRIES: usize = 2;

/// Concurrent embedding calls per document.
pub const EMBED_CONCURRENCY: usize = 4;

/// Dimension of the default embedding model.
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Default model used when a knowledge base does not name one.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

// ---------------------------------------------------------------------------
// Environment resolution
// ---------------------------------------------------------------------------

pub const ENV_EMBED_BASE_URL: &str = "LORECRAWL_EMBED_BASE_URL";
pub const ENV_EMBED_API_KEY: &str = "LORECRAWL_EMBED_API_KEY";
pub const ENV_LANCEDB_URI: &str = "LORECRAWL_LANCEDB_URI";
pub const ENV_VECTORS_DISABLED: &str = "LORECRAWL_VECTORS_DISABLED";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Embedding endpoint base URL: `LORECRAWL_EMBED_BASE_URL` →
/// `OPENAI_BASE_URL` → `https://api.openai.com/v1`.
pub fn resolve_embed_base_url() -> String {
    env_nonempty(ENV_EMBED_BASE_URL)
        .or_else(|| env_nonempty("OPENAI_BASE_URL"))
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
}

/// Embedding API key: `LORECRAWL_EMBED_API_KEY` → `OPENAI_API_KEY` → `None`.
///
/// `None` is valid for key-less local endpoints (Ollama, LM Studio).
pub fn resolve_embed_api_key() -> Option<String> {
    env_nonempty(ENV_EMBED_API_KEY).or_else(|| env_nonempty("OPENAI_API_KEY"))
}

/// LanceDB directory/URI for the chunk vector index.
///
/// Defaults to a persistent on-disk store under `~/.lorecrawl/lancedb`.
/// Set `LORECRAWL_VECTORS_DISABLED=1` to run with the in-memory index
/// instead (useful for smoke testing; nothing survives a restart).
pub fn lancedb_uri() -> Option<String> {
    if let Some(v) = env_nonempty(ENV_VECTORS_DISABLED) {
        if matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on") {
            return None;
        }
    }

    env_nonempty(ENV_LANCEDB_URI).or_else(|| {
        let home = dirs::home_dir()?;
        Some(
            home.join(".lorecrawl")
                .join("lancedb")
                .to_string_lossy()
                .to_string(),
        )
    })
}

/// Listen port: `LORECRAWL_PORT` → `PORT` → 8484.
pub fn resolve_port() -> u16 {
    for k in ["LORECRAWL_PORT", "PORT"] {
        if let Some(v) = env_nonempty(k) {
            if let Ok(p) = v.parse::<u16>() {
                return p;
            }
        }
    }
    8484
}
