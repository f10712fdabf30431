//! Chromium-based renderer using chromiumoxide.
//!
//! One headless Chromium process is launched at service startup and shared
//! for the service lifetime; every scrape gets its own page. The browser
//! is not restarted if it crashes — startup failure is fatal and the
//! process supervisor owns restarts.

use super::{NavigationResult, RenderContext, Renderer};
use crate::config::Config;
use crate::stealth::StealthProfile;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. MENUD_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("MENUD_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 3. Common install locations
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else {
        &[
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
        ]
    };
    for c in candidates {
        let path = PathBuf::from(c);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Chromium-based renderer owning the shared browser process.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    stealth: StealthProfile,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance configured for the upstream
    /// host. Failing here is fatal to the whole service.
    pub async fn launch(cfg: &Config) -> Result<Self> {
        let chrome_path = cfg
            .chromium_path
            .clone()
            .or_else(find_chromium)
            .context("Chromium not found. Install Chrome/Chromium or set MENUD_CHROMIUM_PATH.")?;

        debug!(path = %chrome_path.display(), "launching Chromium");

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-crash-reporter")
            .arg("--mute-audio")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drive the CDP connection for the browser's lifetime.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        info!(host = %cfg.upstream_host, "browser session ready");

        Ok(Self {
            browser: Mutex::new(browser),
            stealth: StealthProfile::new(cfg.upstream_host.clone(), cfg.session_cookies.clone()),
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .context("failed to create new page")?
        };

        // Stealth must land before the first real navigation.
        self.stealth.apply(&page).await?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close browser")?;
        info!("browser session closed");
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Record a document response status. A redirect chain emits one document
/// response per hop; the final hop's status is the one that counts, so
/// later responses overwrite earlier ones.
fn note_document_status(
    slot: &std::sync::Mutex<Option<u16>>,
    resource_type: &ResourceType,
    status: i64,
) {
    if matches!(resource_type, ResourceType::Document) {
        *slot.lock().expect("status lock poisoned") = Some(status as u16);
    }
}

/// A single Chromium page.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        // chromiumoxide does not surface the navigation status directly;
        // watch for the document response on the network event stream.
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to listen for responses")?;
        let status: Arc<std::sync::Mutex<Option<u16>>> = Arc::new(std::sync::Mutex::new(None));
        let status_slot = Arc::clone(&status);
        let watcher = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                note_document_status(&status_slot, &event.r#type, event.response.status);
            }
        });

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            async {
                self.page.goto(url).await?;
                self.page.wait_for_navigation().await?;
                Ok::<_, anyhow::Error>(())
            },
        )
        .await;

        watcher.abort();
        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                let status = *status.lock().expect("status lock poisoned");
                Ok(NavigationResult {
                    final_url,
                    status,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn html(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")?;

        let html: String = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))?;

        Ok(html)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}
