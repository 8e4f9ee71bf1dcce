//! Same-origin discovery crawl.
//!
//! Breadth-first traversal from a job's base URL. Each visited page is
//! rendered in the browser (client-side links count), its anchor hrefs and
//! script-embedded URLs are harvested, and candidates that pass the content
//! classifier join the queue. Progress is flushed to the job store in
//! batches so operators watch the set grow live.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::classify::is_likely_content_url;
use crate::core::config::{DEFAULT_MAX_CRAWL_PAGES, DISCOVERY_NAV_TIMEOUT, PROGRESS_REPORT_EVERY};
use crate::core::error::PipelineError;
use crate::core::types::JobStatus;
use crate::core::AppState;
use crate::jobs::{self, JobEvent};

/// Discover candidate content URLs reachable from `base_url`.
///
/// Guarantees on return: `base_url` is in the result even when its own fetch
/// failed; every other URL shares the base URL's host and passed the
/// classifier; the result never exceeds the crawl cap. Ordering is
/// unspecified.
///
/// Browser-pool failures propagate so the caller can degrade the job;
/// anything that breaks a single page is logged and skipped.
pub async fn discover(
    state: &Arc<AppState>,
    base_url: &str,
    max_pages: usize,
    job_id: Option<&str>,
) -> Result<Vec<String>, PipelineError> {
    let cap = if max_pages == 0 {
        DEFAULT_MAX_CRAWL_PAGES
    } else {
        max_pages
    };

    let origin = Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .ok_or_else(|| PipelineError::NotFound(format!("unparseable base url: {base_url}")))?;

    info!("Starting discovery of {} (cap: {})", base_url, cap);

    let mut discovered: Vec<String> = vec![base_url.to_string()];
    let mut known: HashSet<String> = discovered.iter().cloned().collect();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::from([base_url.to_string()]);
    let mut last_reported = discovered.len();

    while let Some(current) = queue.pop_front() {
        if visited.len() >= cap {
            break;
        }
        if !visited.insert(current.clone()) {
            continue;
        }

        // Externally cancelled jobs abort between pages.
        if let Some(jid) = job_id {
            if job_is_cancelled(state, jid).await {
                warn!("Job {} cancelled externally; stopping discovery", jid);
                break;
            }
        }

        let rendered = match state
            .renderer
            .render(&current, DISCOVERY_NAV_TIMEOUT)
            .await
        {
            Ok(page) => page,
            Err(e @ PipelineError::BrowserUnavailable(_)) => return Err(e),
            Err(e) => {
                warn!("Discovery fetch failed for {}: {}", current, e);
                continue;
            }
        };

        if !is_likely_content_url(&current, Some(&rendered.content_type)) {
            continue;
        }

        // Ingestion will want this page shortly; keep the render warm.
        state
            .page_cache
            .insert(current.clone(), rendered.clone())
            .await;

        for href in harvest_candidates(&rendered.html) {
            if discovered.len() >= cap {
                break;
            }
            let Some(resolved) = resolve_candidate(&current, &href) else {
                continue;
            };
            if !same_host(&resolved, &origin) {
                continue;
            }
            if !is_likely_content_url(&resolved, None) {
                continue;
            }
            if known.insert(resolved.clone()) {
                discovered.push(resolved.clone());
                queue.push_back(resolved);
            }
        }

        if discovered.len() - last_reported >= PROGRESS_REPORT_EVERY {
            last_reported = discovered.len();
            if let Some(jid) = job_id {
                let event = JobEvent::DiscoveryProgress {
                    discovered: discovered.clone(),
                };
                if let Err(e) = jobs::advance(&state.store, jid, event).await {
                    warn!("Progress write failed for job {}: {}", jid, e);
                }
            }
        }
    }

    info!(
        "Discovery of {} finished: {} urls ({} pages visited)",
        base_url,
        discovered.len(),
        visited.len()
    );
    Ok(discovered)
}

/// Discovery worker: runs [`discover`] for a job and finalizes it.
///
/// Catastrophic failure (no browser) degrades to `PENDING` with a
/// base-URL-only set, so downstream selection never sees a stuck job.
pub async fn run_discovery(state: Arc<AppState>, job_id: String) {
    let job = match state.store.find_job(&job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!("Discovery worker: job {} vanished", job_id);
            return;
        }
        Err(e) => {
            warn!("Discovery worker: cannot load job {}: {}", job_id, e);
            return;
        }
    };

    let discovered = match discover(&state, &job.base_url, job.max_pages, Some(&job_id)).await {
        Ok(urls) => urls,
        Err(e) => {
            warn!(
                "Discovery for job {} degraded to base-url fallback: {}",
                job_id, e
            );
            vec![job.base_url.clone()]
        }
    };

    match jobs::advance(&state.store, &job_id, JobEvent::DiscoveryComplete { discovered }).await {
        Ok(job) => info!(
            "Job {} is {:?} with {} discovered urls",
            job_id, job.status, job.total_urls
        ),
        Err(e) => warn!("Could not finalize discovery for job {}: {}", job_id, e),
    }
}

async fn job_is_cancelled(state: &Arc<AppState>, job_id: &str) -> bool {
    matches!(
        state.store.find_job(job_id).await,
        Ok(Some(job)) if job.status == JobStatus::Failed
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Link harvesting
// ─────────────────────────────────────────────────────────────────────────────

/// Every `<a href>` plus any quoted absolute URL or absolute path inside
/// `<script>` text — SPAs often carry their routes only in bootstrap JSON.
pub fn harvest_candidates(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();

    let anchor_sel = Selector::parse("a[href]").unwrap();
    for el in doc.select(&anchor_sel) {
        if let Some(href) = el.value().attr("href") {
            out.push(href.to_string());
        }
    }

    let script_sel = Selector::parse("script").unwrap();
    let link_re = Regex::new(r#"["']((https?://|/)[^"']+)["']"#).unwrap();
    for el in doc.select(&script_sel) {
        let text: String = el.text().collect();
        for cap in link_re.captures_iter(&text) {
            out.push(cap[1].to_string());
        }
    }

    out
}

/// Resolve `href` against the page it appeared on. Non-web schemes,
/// fragments-only links, and unparseable values are dropped; the fragment is
/// always stripped.
pub fn resolve_candidate(page_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let base = Url::parse(page_url).ok()?;
    let mut resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

fn same_host(url: &str, origin_host: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == origin_host))
        .unwrap_or(false)
}
