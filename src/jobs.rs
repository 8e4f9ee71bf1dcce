//! Scrape-job state machine.
//!
//! A [`ScrapeJob`] moves `DISCOVERING → PENDING → IN_PROGRESS → COMPLETED`,
//! with `FAILED` reachable from every non-terminal state. Transitions are
//! pure functions over `(job, event)`; workers apply them through
//! [`advance`], which re-reads the job record so concurrent progress writes
//! never regress (last-writer-wins on progress fields, clamped monotonic).

use std::sync::Arc;

use chrono::Utc;

use crate::core::error::PipelineError;
use crate::core::types::{JobPatch, JobStatus, ScrapeJob};
use crate::store::DocStore;

/// Everything that can happen to a job after creation.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Discovery found more URLs; the job stays `DISCOVERING`.
    DiscoveryProgress { discovered: Vec<String> },
    /// Discovery finished (or degraded to a fallback set); `PENDING`.
    DiscoveryComplete { discovered: Vec<String> },
    /// The operator picked a subset of discovered URLs; `IN_PROGRESS`.
    UrlsSelected { selected: Vec<String> },
    /// One selected URL produced a completed document.
    PageScraped { url: String },
    /// Every selected URL has been attempted; `COMPLETED`.
    IngestionComplete,
    /// Terminal failure, reachable from any non-terminal state.
    Failed { error: String },
}

/// Apply `event` to `job`, returning the updated job.
///
/// Backward transitions and events that do not fit the current state are
/// [`PipelineError::Conflict`]; the job is never left half-updated.
pub fn apply(job: &ScrapeJob, event: JobEvent) -> Result<ScrapeJob, PipelineError> {
    if job.status.is_terminal() {
        return Err(PipelineError::Conflict(format!(
            "job {} is terminal ({:?})",
            job.id, job.status
        )));
    }

    let mut next = job.clone();
    match event {
        JobEvent::DiscoveryProgress { discovered } => {
            if job.status != JobStatus::Discovering {
                return Err(conflict(job, "discovery progress"));
            }
            merge_discovered(&mut next, discovered);
        }
        JobEvent::DiscoveryComplete { discovered } => {
            if job.status != JobStatus::Discovering {
                return Err(conflict(job, "discovery completion"));
            }
            merge_discovered(&mut next, discovered);
            next.status = JobStatus::Pending;
        }
        JobEvent::UrlsSelected { selected } => {
            if job.status != JobStatus::Pending {
                return Err(conflict(job, "url selection"));
            }
            for url in &selected {
                if !next.discovered_urls.iter().any(|u| u == url) {
                    return Err(PipelineError::Conflict(format!(
                        "selected url was never discovered: {url}"
                    )));
                }
            }
            next.selected_urls = selected;
            next.status = JobStatus::InProgress;
        }
        JobEvent::PageScraped { url } => {
            if job.status != JobStatus::InProgress {
                return Err(conflict(job, "scrape progress"));
            }
            if !next.scraped_urls.iter().any(|u| u == &url) {
                next.scraped_urls.push(url);
            }
            next.scraped_count = next.scraped_count.max(next.scraped_urls.len());
        }
        JobEvent::IngestionComplete => {
            if job.status != JobStatus::InProgress {
                return Err(conflict(job, "ingestion completion"));
            }
            next.status = JobStatus::Completed;
            next.completed_at = Some(Utc::now());
        }
        JobEvent::Failed { error } => {
            next.status = JobStatus::Failed;
            next.error_message = Some(error);
            next.completed_at = Some(Utc::now());
        }
    }

    Ok(next)
}

/// Re-read the job, apply `event`, and persist the resulting patch.
///
/// This is the only path workers use to mutate a job, so every write goes
/// through a fresh read of the record (§ shared-resource discipline).
pub async fn advance(
    store: &Arc<dyn DocStore>,
    job_id: &str,
    event: JobEvent,
) -> Result<ScrapeJob, PipelineError> {
    let job = store
        .find_job(job_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("job {job_id}")))?;
    let next = apply(&job, event)?;
    let patch = JobPatch {
        status: Some(next.status),
        discovered_urls: Some(next.discovered_urls.clone()),
        selected_urls: Some(next.selected_urls.clone()),
        total_urls: Some(next.total_urls),
        scraped_urls: Some(next.scraped_urls.clone()),
        scraped_count: Some(next.scraped_count),
        error_message: next.error_message.clone(),
        completed_at: next.completed_at,
    };
    store.update_job(job_id, patch).await
}

fn conflict(job: &ScrapeJob, what: &str) -> PipelineError {
    PipelineError::Conflict(format!(
        "job {} cannot accept {what} while {:?}",
        job.id, job.status
    ))
}

/// Union new URLs into the discovered set, keeping the base URL present and
/// `total_urls` monotonic.
fn merge_discovered(job: &mut ScrapeJob, discovered: Vec<String>) {
    if !job.discovered_urls.iter().any(|u| u == &job.base_url) {
        let base = job.base_url.clone();
        job.discovered_urls.insert(0, base);
    }
    for url in discovered {
        if !job.discovered_urls.iter().any(|u| u == &url) {
            job.discovered_urls.push(url);
        }
    }
    job.total_urls = job.total_urls.max(job.discovered_urls.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ScrapeJob {
        ScrapeJob::new(
            "https://ex.com".into(),
            "kb-1".into(),
            "user-1".into(),
            0,
        )
    }

    #[test]
    fn full_happy_path() {
        let j = job();
        let j = apply(
            &j,
            JobEvent::DiscoveryComplete {
                discovered: vec!["https://ex.com".into(), "https://ex.com/a".into()],
            },
        )
        .unwrap();
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.total_urls, 2);

        let j = apply(
            &j,
            JobEvent::UrlsSelected {
                selected: vec!["https://ex.com/a".into()],
            },
        )
        .unwrap();
        assert_eq!(j.status, JobStatus::InProgress);

        let j = apply(
            &j,
            JobEvent::PageScraped {
                url: "https://ex.com/a".into(),
            },
        )
        .unwrap();
        assert_eq!(j.scraped_count, 1);

        let j = apply(&j, JobEvent::IngestionComplete).unwrap();
        assert_eq!(j.status, JobStatus::Completed);
        assert!(j.completed_at.is_some());
    }

    #[test]
    fn selection_must_be_subset_of_discovered() {
        let j = apply(
            &job(),
            JobEvent::DiscoveryComplete {
                discovered: vec!["https://ex.com/a".into()],
            },
        )
        .unwrap();
        let err = apply(
            &j,
            JobEvent::UrlsSelected {
                selected: vec!["https://ex.com/not-discovered".into()],
            },
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
    }

    #[test]
    fn no_backward_transitions() {
        let j = apply(
            &job(),
            JobEvent::DiscoveryComplete {
                discovered: vec![],
            },
        )
        .unwrap();
        // Pending job cannot receive discovery progress again.
        let err = apply(
            &j,
            JobEvent::DiscoveryProgress {
                discovered: vec!["https://ex.com/b".into()],
            },
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
    }

    #[test]
    fn terminal_states_reject_everything() {
        let j = apply(
            &job(),
            JobEvent::Failed {
                error: "boom".into(),
            },
        )
        .unwrap();
        assert_eq!(j.status, JobStatus::Failed);
        let err = apply(&j, JobEvent::IngestionComplete).unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
    }

    #[test]
    fn failure_reachable_from_any_live_state() {
        for setup in [
            None,
            Some(JobEvent::DiscoveryComplete { discovered: vec![] }),
        ] {
            let mut j = job();
            if let Some(ev) = setup {
                j = apply(&j, ev).unwrap();
            }
            let failed = apply(
                &j,
                JobEvent::Failed {
                    error: "external cancel".into(),
                },
            )
            .unwrap();
            assert_eq!(failed.status, JobStatus::Failed);
            assert_eq!(failed.error_message.as_deref(), Some("external cancel"));
        }
    }

    #[test]
    fn base_url_always_in_discovered() {
        let j = apply(
            &job(),
            JobEvent::DiscoveryComplete {
                discovered: vec!["https://ex.com/a".into()],
            },
        )
        .unwrap();
        assert!(j.discovered_urls.iter().any(|u| u == "https://ex.com"));
    }

    #[test]
    fn scraped_count_is_deduplicated_and_monotonic() {
        let j = apply(
            &job(),
            JobEvent::DiscoveryComplete {
                discovered: vec!["https://ex.com/a".into()],
            },
        )
        .unwrap();
        let j = apply(
            &j,
            JobEvent::UrlsSelected {
                selected: vec!["https://ex.com/a".into()],
            },
        )
        .unwrap();
        let j = apply(
            &j,
            JobEvent::PageScraped {
                url: "https://ex.com/a".into(),
            },
        )
        .unwrap();
        let j = apply(
            &j,
            JobEvent::PageScraped {
                url: "https://ex.com/a".into(),
            },
        )
        .unwrap();
        assert_eq!(j.scraped_count, 1);
    }
}
