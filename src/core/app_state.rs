use std::sync::Arc;

use crate::scraping::{BrowserPool, BrowserRenderer, PageRenderer, RenderedPage};
use crate::store::{DocStore, Embedder, VectorStore};

/// Process-wide services, shared by the HTTP surface and every worker.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub renderer: Arc<dyn PageRenderer>,
    /// The one browser for the whole process; the renderer draws tabs from it.
    pub browser_pool: Arc<BrowserPool>,
    /// Rendered pages kept warm between discovery and ingestion (key: url).
    pub page_cache: moka::future::Cache<String, RenderedPage>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("vector_dimension", &self.vectors.dimension())
            .field("page_cache_entries", &self.page_cache.entry_count())
            .finish()
    }
}

impl AppState {
    /// Wire up production services around the given ports. The browser is
    /// not launched here — the pool starts it lazily on first page checkout.
    pub fn new(
        store: Arc<dyn DocStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let browser_pool = BrowserPool::new();
        let renderer = BrowserRenderer::new(browser_pool.clone());
        Self {
            store,
            vectors,
            embedder,
            renderer,
            browser_pool,
            page_cache: moka::future::Cache::builder()
                .max_capacity(2_000)
                .time_to_live(std::time::Duration::from_secs(60 * 30))
                .build(),
        }
    }

    /// Substitute the page renderer — test code swaps in canned-HTML fakes.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}
