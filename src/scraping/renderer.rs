//! Page rendering service.
//!
//! [`PageRenderer`] is the seam between the pipeline and the browser: the
//! production [`BrowserRenderer`] drives a pooled tab through navigation,
//! dynamic-content settling, lazy-load interaction, and HTML capture; tests
//! substitute canned-HTML fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use tracing::debug;

use crate::core::config::{DYNAMIC_CONTENT_WAIT, POST_INTERACT_WAIT};
use crate::core::error::PipelineError;

use super::browser_pool::BrowserPool;

/// A fully rendered page, after client-side scripts have had their chance.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub content_type: String,
    pub html: String,
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Navigate to `url`, let dynamic content settle, and capture the DOM.
    ///
    /// `nav_timeout` bounds navigation only; the fixed settle waits come on
    /// top. Navigation failures are [`PipelineError::TransientNetwork`];
    /// pool exhaustion is [`PipelineError::BrowserUnavailable`].
    async fn render(&self, url: &str, nav_timeout: Duration)
        -> Result<RenderedPage, PipelineError>;
}

/// Clicks anything that looks like a lazy-load control, capped so a sticky
/// "next" button cannot loop forever.
const CLICK_LOAD_MORE_JS: &str = r#"
(() => {
    const pattern = /load more|show more|next|meer|volgende/i;
    const candidates = Array.from(document.querySelectorAll('button, a, [role="button"]'));
    let clicks = 0;
    for (const el of candidates) {
        if (clicks >= 3) break;
        const text = (el.innerText || '').trim();
        if (text && pattern.test(text)) {
            try { el.click(); clicks += 1; } catch (_) {}
        }
    }
    return clicks;
})()
"#;

const SCROLL_TO_BOTTOM_JS: &str =
    "window.scrollTo(0, document.body ? document.body.scrollHeight : 0)";

pub struct BrowserRenderer {
    pool: Arc<BrowserPool>,
}

impl BrowserRenderer {
    pub fn new(pool: Arc<BrowserPool>) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl PageRenderer for BrowserRenderer {
    async fn render(
        &self,
        url: &str,
        nav_timeout: Duration,
    ) -> Result<RenderedPage, PipelineError> {
        let pooled = self.pool.get_page().await?;
        let result = drive_page(pooled.page(), url, nav_timeout).await;
        pooled.release().await;
        result
    }
}

async fn drive_page(
    page: &Page,
    url: &str,
    nav_timeout: Duration,
) -> Result<RenderedPage, PipelineError> {
    debug!("Rendering: {}", url);

    // Navigate, waiting for the DOM-content-loaded lifecycle under timeout.
    let navigation = async {
        page.goto(url)
            .await
            .map_err(|e| PipelineError::TransientNetwork(format!("navigation to {url}: {e}")))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| PipelineError::TransientNetwork(format!("lifecycle wait for {url}: {e}")))?;
        Ok::<(), PipelineError>(())
    };
    tokio::time::timeout(nav_timeout, navigation)
        .await
        .map_err(|_| {
            PipelineError::TransientNetwork(format!(
                "navigation to {url} timed out after {}s",
                nav_timeout.as_secs()
            ))
        })??;

    // The response content type, as the browser saw it.
    let content_type: String = page
        .evaluate("document.contentType")
        .await
        .ok()
        .and_then(|v| v.into_value().ok())
        .unwrap_or_else(|| "text/html".to_string());

    // Let client-side rendering finish, then coax lazy content out.
    tokio::time::sleep(DYNAMIC_CONTENT_WAIT).await;
    if let Err(e) = page.evaluate(SCROLL_TO_BOTTOM_JS).await {
        debug!("Scroll-to-bottom failed (non-fatal): {}", e);
    }
    if let Err(e) = page.evaluate(CLICK_LOAD_MORE_JS).await {
        debug!("Load-more click pass failed (non-fatal): {}", e);
    }
    tokio::time::sleep(POST_INTERACT_WAIT).await;

    let html = page
        .content()
        .await
        .map_err(|e| PipelineError::TransientNetwork(format!("content capture for {url}: {e}")))?;

    Ok(RenderedPage {
        url: url.to_string(),
        content_type,
        html,
    })
}
