//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). The stealth
//! profile — headers, cookies, fingerprint patches, resource blocking —
//! is applied inside the engine implementation, so the fetch and batch
//! layers never see it and the evasion strategy can be swapped wholesale.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// HTTP status of the document response, if one was observed.
    pub status: Option<u16>,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

impl NavigationResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s))
    }
}

/// A browser engine that can create rendering contexts.
///
/// One engine instance owns one shared browser process for the service
/// lifetime; contexts (pages) are the unit of per-request parallelism.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new isolated page with the stealth profile already applied.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the shared browser process.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser page for rendering one upstream request at a time.
#[async_trait]
pub trait RenderContext: Send {
    /// Navigate to a URL with a timeout, reporting the document status.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Get the full rendered page HTML.
    async fn html(&self) -> Result<String>;
    /// Close this page.
    async fn close(self: Box<Self>) -> Result<()>;
}
