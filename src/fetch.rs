//! Navigation with bounded retry.
//!
//! The upstream throttles and intermittently refuses non-human-looking
//! traffic, so every fetch runs as an explicit loop carrying an attempt
//! counter and the last error. The policy (attempt ceiling, fixed
//! inter-retry delay, pre-request jitter window, navigation timeout) is
//! plain data so tests inject zero delays and count attempts directly.
//!
//! Retryable: no document response, HTTP 429, any other non-2xx status,
//! and navigation errors/timeouts. Not retryable: extraction failures on
//! a rendered 2xx page — a page without a payload will not grow one.

use crate::error::ScrapeError;
use crate::extract;
use crate::renderer::RenderContext;
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for upstream navigation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Jitter window; each attempt first sleeps uniform-random in
    /// `[0, rate_limit_delay)` to desynchronize concurrent pages.
    pub rate_limit_delay: Duration,
    /// Per-navigation timeout.
    pub navigation_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_millis(1000),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Zero-delay policy for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            navigation_timeout: Duration::from_secs(5),
        }
    }
}

async fn jitter(window: Duration) {
    // Jitter has millisecond granularity; a sub-millisecond window means
    // no jitter rather than sampling an empty range.
    let window_ms = window.as_millis() as u64;
    if window_ms == 0 {
        return;
    }
    let ms = rand::thread_rng().gen_range(0..window_ms);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Navigate `ctx` to `url` and return the JSON payload embedded in the
/// rendered page, retrying per `policy`.
pub async fn vendor_json(
    ctx: &mut dyn RenderContext,
    url: &str,
    policy: &RetryPolicy,
) -> Result<Value, ScrapeError> {
    let mut attempt: u32 = 0;
    let mut last_err: Option<ScrapeError> = None;

    loop {
        attempt += 1;
        jitter(policy.rate_limit_delay).await;

        let nav = ctx
            .navigate(url, policy.navigation_timeout.as_millis() as u64)
            .await;

        match nav {
            Ok(result) if result.is_success() => {
                debug!(url, attempt, status = ?result.status, "navigation succeeded");
                let html = ctx
                    .html()
                    .await
                    .map_err(|e| ScrapeError::Browser(format!("failed to read page: {e}")))?;
                // Extraction is a single attempt — its failure is final.
                return extract::embedded_json(&html);
            }
            Ok(result) => {
                last_err = Some(match result.status {
                    Some(429) => ScrapeError::RateLimited { attempts: attempt },
                    Some(status) => ScrapeError::Navigation {
                        attempts: attempt,
                        message: format!("upstream returned HTTP {status}"),
                    },
                    None => ScrapeError::Navigation {
                        attempts: attempt,
                        message: "no response received".into(),
                    },
                });
            }
            Err(e) => {
                last_err = Some(ScrapeError::Navigation {
                    attempts: attempt,
                    message: e.to_string(),
                });
            }
        }

        if attempt > policy.max_retries {
            // Exhausted: propagate the most recent failure.
            return Err(last_err.unwrap_or(ScrapeError::Navigation {
                attempts: attempt,
                message: "navigation failed".into(),
            }));
        }

        warn!(url, attempt, max_retries = policy.max_retries, "retrying navigation");
        tokio::time::sleep(policy.retry_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::NavigationResult;
    use async_trait::async_trait;

    /// Scripted page: each navigation pops the next status; `None` means
    /// "no document response observed".
    struct ScriptedContext {
        statuses: Vec<Option<u16>>,
        navigations: usize,
        html: String,
    }

    impl ScriptedContext {
        fn new(statuses: Vec<Option<u16>>, html: &str) -> Self {
            Self {
                statuses,
                navigations: 0,
                html: html.to_string(),
            }
        }
    }

    #[async_trait]
    impl RenderContext for ScriptedContext {
        async fn navigate(
            &mut self,
            url: &str,
            _timeout_ms: u64,
        ) -> anyhow::Result<NavigationResult> {
            let status = self
                .statuses
                .get(self.navigations)
                .copied()
                .unwrap_or(Some(200));
            self.navigations += 1;
            Ok(NavigationResult {
                final_url: url.to_string(),
                status,
                load_time_ms: 1,
            })
        }

        async fn html(&self) -> anyhow::Result<String> {
            Ok(self.html.clone())
        }

        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    const PAYLOAD_HTML: &str = r#"<pre>{"data":{"code":"v1"}}</pre>"#;

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let mut ctx = ScriptedContext::new(vec![Some(500), Some(500), Some(200)], PAYLOAD_HTML);
        let value = vendor_json(&mut ctx, "https://u/x", &RetryPolicy::immediate(3))
            .await
            .unwrap();
        assert_eq!(value["data"]["code"], "v1");
        assert_eq!(ctx.navigations, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_navigation_error() {
        let mut ctx = ScriptedContext::new(vec![Some(500); 10], PAYLOAD_HTML);
        let err = vendor_json(&mut ctx, "https://u/x", &RetryPolicy::immediate(3))
            .await
            .unwrap_err();
        // 1 initial + 3 retries
        assert_eq!(ctx.navigations, 4);
        match err {
            ScrapeError::Navigation { attempts, message } => {
                assert_eq!(attempts, 4);
                assert!(message.contains("500"));
            }
            other => panic!("expected Navigation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_429_surfaces_as_rate_limited() {
        let mut ctx = ScriptedContext::new(vec![Some(429); 10], PAYLOAD_HTML);
        let err = vendor_json(&mut ctx, "https://u/x", &RetryPolicy::immediate(2))
            .await
            .unwrap_err();
        assert_eq!(ctx.navigations, 3);
        assert!(matches!(err, ScrapeError::RateLimited { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_no_response_is_retryable() {
        let mut ctx = ScriptedContext::new(vec![None, Some(200)], PAYLOAD_HTML);
        let value = vendor_json(&mut ctx, "https://u/x", &RetryPolicy::immediate(3))
            .await
            .unwrap();
        assert_eq!(value["data"]["code"], "v1");
        assert_eq!(ctx.navigations, 2);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_not_retried() {
        let mut ctx = ScriptedContext::new(vec![Some(200); 10], "<html>no payload</html>");
        let err = vendor_json(&mut ctx, "https://u/x", &RetryPolicy::immediate(3))
            .await
            .unwrap_err();
        // Exactly one navigation: extraction failures are permanent.
        assert_eq!(ctx.navigations, 1);
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_submillisecond_jitter_window_means_no_jitter() {
        let mut ctx = ScriptedContext::new(vec![Some(200)], PAYLOAD_HTML);
        let policy = RetryPolicy {
            rate_limit_delay: Duration::from_micros(500),
            ..RetryPolicy::immediate(3)
        };
        let value = vendor_json(&mut ctx, "https://u/x", &policy).await.unwrap();
        assert_eq!(value["data"]["code"], "v1");
        assert_eq!(ctx.navigations, 1);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let mut ctx = ScriptedContext::new(vec![Some(503); 10], PAYLOAD_HTML);
        let err = vendor_json(&mut ctx, "https://u/x", &RetryPolicy::immediate(0))
            .await
            .unwrap_err();
        assert_eq!(ctx.navigations, 1);
        assert!(matches!(err, ScrapeError::Navigation { attempts: 1, .. }));
    }
}
