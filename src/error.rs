//! Error taxonomy for the scraping pipeline.
//!
//! Each variant maps to one failure class with a distinct handling policy:
//! navigation and rate-limit failures are retried by the fetch loop,
//! extraction and transform failures are permanent for that fetch, and
//! cache failures are surfaced per call. Batch validation never reaches
//! this type — it is rejected at the HTTP layer before any browser work.

use thiserror::Error;

/// Failures produced by the per-vendor scrape pipeline.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Navigation failed after exhausting retries: no response, a non-2xx
    /// status, a timeout, or a browser-level navigation error.
    #[error("navigation failed after {attempts} attempts: {message}")]
    Navigation { attempts: u32, message: String },

    /// The upstream answered HTTP 429 on every attempt.
    #[error("rate limited by upstream after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// The rendered page contained no parseable JSON document. Never retried.
    #[error("failed to extract JSON from page content: {0}")]
    Extraction(String),

    /// The payload parsed but a mandatory identity field was absent.
    #[error("malformed vendor payload: {0}")]
    Transform(String),

    /// The menu store rejected a read or write.
    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// The menu store could not be opened or reached on disk.
    #[error("cache store unavailable: {0}")]
    Store(#[from] std::io::Error),

    /// A menu row failed to encode or decode (schema drift on disk).
    #[error("menu serialization failed: {0}")]
    Codec(#[from] serde_json::Error),

    /// Browser or page lifecycle failure outside navigation itself
    /// (context creation, HTML capture). Propagated without retry.
    #[error("browser error: {0}")]
    Browser(String),
}

impl ScrapeError {
    /// Short machine-readable kind, used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Navigation { .. } => "navigation",
            Self::RateLimited { .. } => "rate_limited",
            Self::Extraction(_) => "extraction",
            Self::Transform(_) => "transform",
            Self::Cache(_) => "cache",
            Self::Store(_) => "cache",
            Self::Codec(_) => "codec",
            Self::Browser(_) => "browser",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_attempt_count() {
        let err = ScrapeError::Navigation {
            attempts: 4,
            message: "HTTP 503".into(),
        };
        assert!(err.to_string().contains("4 attempts"));
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(
            ScrapeError::Extraction("no braces".into()).kind(),
            "extraction"
        );
        assert_eq!(ScrapeError::RateLimited { attempts: 4 }.kind(), "rate_limited");
    }
}
