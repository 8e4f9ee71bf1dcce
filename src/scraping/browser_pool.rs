//! Shared headless-browser pool built on `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable Chromium-family executable (env override → PATH scan →
//!   well-known install paths).
//! * Launching one long-lived headless browser for the whole process, lazily
//!   and guarded against concurrent launches.
//! * Handing out fresh pages with resource interception installed — image,
//!   font, stylesheet, and media requests are aborted so only the DOM and
//!   scripts are fetched.
//!
//! A semaphore caps concurrent tabs across all jobs; callers over the cap
//! wait for capacity rather than spawning more browser load.

use std::path::Path;
use std::sync::Arc;

use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::config::{ENV_CHROME_EXECUTABLE, MAX_BROWSER_PAGES};
use crate::core::error::PipelineError;

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (works great in Docker:
///    `CHROME_EXECUTABLE=/usr/bin/chromium`)
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var(ENV_CHROME_EXECUTABLE) {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build a `BrowserConfig` for headless operation inside containers: no GPU,
/// no sandbox, shared-memory hints, telemetry off.
fn build_headless_config(exe: &str) -> Result<BrowserConfig, PipelineError> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: 1280,
            height: 900,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1280, 900)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // required in Docker / CI environments
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage") // avoids /dev/shm OOM in Docker
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-breakpad")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .build()
        .map_err(|e| PipelineError::BrowserUnavailable(format!("browser config: {e}")))
}

struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

/// Process-wide browser pool. One browser, many tabs.
pub struct BrowserPool {
    handle: Mutex<Option<BrowserHandle>>,
    tabs: Arc<Semaphore>,
}

impl BrowserPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handle: Mutex::new(None),
            tabs: Arc::new(Semaphore::new(MAX_BROWSER_PAGES)),
        })
    }

    /// Check out a fresh page with interception installed.
    ///
    /// Blocks while the tab cap is saturated. Fails with
    /// [`PipelineError::BrowserUnavailable`] when no browser can be launched.
    pub async fn get_page(self: &Arc<Self>) -> Result<PooledPage, PipelineError> {
        let permit = self
            .tabs
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::BrowserUnavailable("pool is shut down".into()))?;

        let page = self.new_page_checked().await?;
        install_interception(&page).await?;

        Ok(PooledPage {
            page,
            _permit: permit,
        })
    }

    /// Open a tab, relaunching the browser once if the running one is dead.
    async fn new_page_checked(&self) -> Result<Page, PipelineError> {
        let mut guard = self.handle.lock().await;

        // Cheap liveness probe before trusting an existing browser.
        let dead = match guard.as_ref() {
            Some(handle) => handle.browser.version().await.is_err(),
            None => false,
        };
        if dead {
            warn!("Browser process is unresponsive; relaunching");
            if let Some(mut old) = guard.take() {
                old.browser.close().await.ok();
                old.handler_task.abort();
            }
        }

        if guard.is_none() {
            *guard = Some(launch_browser().await?);
        }

        let handle = guard.as_mut().unwrap();
        handle
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| PipelineError::BrowserUnavailable(format!("failed to open page: {e}")))
    }

    /// Close the browser process and all pages. Idempotent.
    pub async fn shutdown(&self) {
        let mut guard = self.handle.lock().await;
        if let Some(mut handle) = guard.take() {
            if let Err(e) = handle.browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
            handle.handler_task.abort();
            info!("Browser pool shut down");
        }
    }
}

async fn launch_browser() -> Result<BrowserHandle, PipelineError> {
    let exe = find_chrome_executable().ok_or_else(|| {
        PipelineError::BrowserUnavailable(
            "no browser found; install Chromium or Chrome, or set CHROME_EXECUTABLE".into(),
        )
    })?;

    info!("Launching headless browser: {}", exe);
    let config = build_headless_config(&exe)?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| PipelineError::BrowserUnavailable(format!("launch failed ({exe}): {e}")))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                error!("CDP handler error: {}", e);
            }
        }
    });

    Ok(BrowserHandle {
        browser,
        handler_task,
    })
}

/// Abort image/font/stylesheet/media requests on this page; everything else
/// continues untouched. Only the DOM and scripts come over the wire.
async fn install_interception(page: &Page) -> Result<(), PipelineError> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| PipelineError::BrowserUnavailable(format!("interception listener: {e}")))?;

    page.execute(EnableParams::default())
        .await
        .map_err(|e| PipelineError::BrowserUnavailable(format!("fetch enable: {e}")))?;

    let driver = page.clone();
    tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let request_id = event.request_id.clone();
            let blocked = matches!(
                &event.resource_type,
                ResourceType::Image
                    | ResourceType::Font
                    | ResourceType::Stylesheet
                    | ResourceType::Media
            );
            let outcome = if blocked {
                driver
                    .execute(FailRequestParams::new(request_id, ErrorReason::Aborted))
                    .await
                    .map(|_| ())
            } else {
                driver
                    .execute(ContinueRequestParams::new(request_id))
                    .await
                    .map(|_| ())
            };
            if outcome.is_err() {
                // Page is gone; the listener dies with it.
                debug!("Request interception loop ended");
                break;
            }
        }
    });

    Ok(())
}

/// A checked-out tab. Holds its pool permit until released or dropped.
pub struct PooledPage {
    page: Page,
    _permit: OwnedSemaphorePermit,
}

impl PooledPage {
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the tab and free its pool slot. Sibling pages are untouched.
    pub async fn release(self) {
        if let Err(e) = self.page.close().await {
            debug!("Page close error (non-fatal): {}", e);
        }
        // permit drops here
    }
}
