//! Batch scrape orchestration.
//!
//! `MenuService` is the explicit service context: it owns the renderer
//! handle, the menu cache, the retry policy and the upstream location, and
//! is passed (behind `Arc`) to the HTTP layer. Construction with an
//! in-memory cache and a mock renderer is the intended test setup.
//!
//! Each vendor code runs the same pipeline: cache lookup, then on a miss a
//! fresh page, navigate-with-retry, JSON extraction, normalization, cache
//! write. Codes fan out concurrently with a bounded, order-preserving
//! buffer; a failure for one code becomes an inline error entry and never
//! disturbs its siblings. Duplicate codes in one batch are processed
//! independently — two concurrent misses for the same code may both fetch
//! and both write, which is benign because writes replace whole rows.

use crate::cache::MenuCache;
use crate::config::Config;
use crate::error::ScrapeError;
use crate::fetch::{self, RetryPolicy};
use crate::model::{BatchEntry, Coordinates, VendorMenu};
use crate::renderer::Renderer;
use crate::transform;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// The scraping service shared by all HTTP requests.
pub struct MenuService {
    renderer: Arc<dyn Renderer>,
    cache: Arc<MenuCache>,
    policy: RetryPolicy,
    upstream_host: String,
    fan_out: usize,
}

impl MenuService {
    pub fn new(renderer: Arc<dyn Renderer>, cache: Arc<MenuCache>, cfg: &Config) -> Self {
        Self {
            renderer,
            cache,
            policy: cfg.retry.clone(),
            upstream_host: cfg.upstream_host.clone(),
            fan_out: cfg.fan_out.max(1),
        }
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// Run one batch: one entry per input code, in input order.
    ///
    /// Fails as a whole only when the cache store itself is unavailable;
    /// every per-code failure is reported inline.
    pub async fn run_batch(
        &self,
        codes: &[String],
        coords: Coordinates,
    ) -> Result<Vec<BatchEntry>, ScrapeError> {
        self.cache.ping()?;

        let started = Instant::now();
        let entries: Vec<BatchEntry> = futures::stream::iter(codes.iter().cloned())
            .map(|code| self.entry_for(code, coords))
            .buffered(self.fan_out)
            .collect()
            .await;

        let failed = entries.iter().filter(|e| e.is_error()).count();
        info!(
            codes = codes.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch complete"
        );
        Ok(entries)
    }

    async fn entry_for(&self, code: String, coords: Coordinates) -> BatchEntry {
        match self.menu_for(&code, coords).await {
            Ok(menu) => BatchEntry::Menu(menu),
            Err(e) => {
                warn!(vendor = %code, kind = e.kind(), error = %e, "scrape failed");
                BatchEntry::Error {
                    code,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Fetch-or-cache-hit pipeline for a single vendor code.
    async fn menu_for(&self, code: &str, coords: Coordinates) -> Result<VendorMenu, ScrapeError> {
        if let Some(hit) = self.cache.get(code)? {
            debug!(vendor = code, "cache hit");
            return Ok(hit);
        }

        let url = self.vendor_url(code, coords)?;

        let mut ctx = self
            .renderer
            .new_context()
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        let fetched = fetch::vendor_json(ctx.as_mut(), url.as_str(), &self.policy).await;
        // The page is released on every exit path, success or not, before
        // the fetch outcome is inspected.
        if let Err(e) = ctx.close().await {
            warn!(vendor = code, error = %e, "failed to close page");
        }

        let menu = transform::vendor_menu(&fetched?)?;
        self.cache.set(code, &menu)?;
        debug!(vendor = code, "menu cached");
        Ok(menu)
    }

    /// `https://{host}/api/v5/vendors/{code}?include=menus&longitude=&latitude=`
    fn vendor_url(&self, code: &str, coords: Coordinates) -> Result<Url, ScrapeError> {
        let mut url = Url::parse(&format!(
            "https://{}/api/v5/vendors/{}",
            self.upstream_host, code
        ))
        .map_err(|e| ScrapeError::Browser(format!("invalid upstream URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("include", "menus")
            .append_pair("longitude", &coords.longitude.to_string())
            .append_pair("latitude", &coords.latitude.to_string());

        Ok(url)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Mock renderer used by service and pipeline tests.

    use crate::renderer::{NavigationResult, RenderContext, Renderer};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// What the fake upstream does for one vendor code.
    #[derive(Clone)]
    pub enum Upstream {
        /// 200 with this payload rendered into viewer markup.
        Menu(serde_json::Value),
        /// Always this HTTP status.
        Status(u16),
        /// 200 with content that contains no JSON.
        Garbage,
    }

    pub struct MockRenderer {
        pub by_code: HashMap<String, Upstream>,
        pub contexts_opened: Arc<AtomicUsize>,
        pub open_contexts: Arc<AtomicUsize>,
    }

    impl MockRenderer {
        pub fn new(by_code: HashMap<String, Upstream>) -> Self {
            Self {
                by_code,
                contexts_opened: Arc::new(AtomicUsize::new(0)),
                open_contexts: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Renderer for MockRenderer {
        async fn new_context(&self) -> anyhow::Result<Box<dyn RenderContext>> {
            self.contexts_opened.fetch_add(1, Ordering::SeqCst);
            self.open_contexts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockContext {
                by_code: self.by_code.clone(),
                open_contexts: Arc::clone(&self.open_contexts),
                last: None,
            }))
        }

        async fn shutdown(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn active_contexts(&self) -> usize {
            self.open_contexts.load(Ordering::SeqCst)
        }
    }

    struct MockContext {
        by_code: HashMap<String, Upstream>,
        open_contexts: Arc<AtomicUsize>,
        last: Option<Upstream>,
    }

    #[async_trait]
    impl RenderContext for MockContext {
        async fn navigate(
            &mut self,
            url: &str,
            _timeout_ms: u64,
        ) -> anyhow::Result<NavigationResult> {
            let upstream = self
                .by_code
                .iter()
                .find(|(code, _)| url.contains(&format!("/vendors/{code}?")))
                .map(|(_, u)| u.clone())
                .unwrap_or(Upstream::Status(404));

            let status = match &upstream {
                Upstream::Menu(_) | Upstream::Garbage => 200,
                Upstream::Status(s) => *s,
            };
            self.last = Some(upstream);

            Ok(NavigationResult {
                final_url: url.to_string(),
                status: Some(status),
                load_time_ms: 1,
            })
        }

        async fn html(&self) -> anyhow::Result<String> {
            Ok(match &self.last {
                Some(Upstream::Menu(payload)) => {
                    format!("<html><body><pre>{payload}</pre></body></html>")
                }
                _ => "<html><body>nothing to see</body></html>".to_string(),
            })
        }

        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            self.open_contexts.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub fn payload(code: &str) -> serde_json::Value {
        serde_json::json!({
            "data": {
                "code": code,
                "web_path": format!("/restaurant/{code}"),
                "chain": { "name": format!("Vendor {code}") },
                "menus": [{
                    "id": 1,
                    "menu_categories": [{
                        "id": 10,
                        "name": "Mains",
                        "products": [{
                            "id": 100,
                            "name": "Dish",
                            "display_price": 12.0
                        }]
                    }]
                }]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{payload, MockRenderer, Upstream};
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            retry: RetryPolicy::immediate(3),
            ..Config::default()
        }
    }

    fn service_with(
        upstreams: Vec<(&str, Upstream)>,
        cfg: Config,
    ) -> (MenuService, Arc<MenuCache>, Arc<std::sync::atomic::AtomicUsize>) {
        let renderer = MockRenderer::new(
            upstreams
                .into_iter()
                .map(|(c, u)| (c.to_string(), u))
                .collect::<HashMap<_, _>>(),
        );
        let opened = Arc::clone(&renderer.contexts_opened);
        let cache = Arc::new(MenuCache::in_memory(Duration::from_secs(3600)).unwrap());
        let service = MenuService::new(Arc::new(renderer), Arc::clone(&cache), &cfg);
        (service, cache, opened)
    }

    fn coords() -> Coordinates {
        Coordinates {
            latitude: 24.17,
            longitude: 120.64,
        }
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_partial_batch_failure_is_isolated() {
        let (service, _cache, _) = service_with(
            vec![
                ("aaa", Upstream::Menu(payload("aaa"))),
                ("bad", Upstream::Status(500)),
                ("ccc", Upstream::Menu(payload("ccc"))),
            ],
            test_config(),
        );

        let entries = service
            .run_batch(&codes(&["aaa", "bad", "ccc"]), coords())
            .await
            .unwrap();

        assert_eq!(entries.len(), 3);
        assert!(!entries[0].is_error());
        assert!(entries[1].is_error());
        assert!(!entries[2].is_error());
        // Input order is preserved.
        match &entries[2] {
            BatchEntry::Menu(m) => assert_eq!(m.code, "ccc"),
            other => panic!("expected menu, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_opens_no_page() {
        let (service, cache, opened) =
            service_with(vec![("aaa", Upstream::Menu(payload("aaa")))], test_config());

        let warm = transform::vendor_menu(&payload("aaa")).unwrap();
        cache.set("aaa", &warm).unwrap();

        let entries = service.run_batch(&codes(&["aaa"]), coords()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_error());
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_scrape_populates_cache() {
        let (service, cache, opened) =
            service_with(vec![("aaa", Upstream::Menu(payload("aaa")))], test_config());

        assert!(cache.get("aaa").unwrap().is_none());
        service.run_batch(&codes(&["aaa"]), coords()).await.unwrap();

        let cached = cache.get("aaa").unwrap().expect("menu should be cached");
        assert_eq!(cached.code, "aaa");
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_codes_yield_independent_entries() {
        let mut cfg = test_config();
        // Serial fan-out makes the second occurrence a deterministic hit.
        cfg.fan_out = 1;
        let (service, _cache, opened) =
            service_with(vec![("aaa", Upstream::Menu(payload("aaa")))], cfg);

        let entries = service
            .run_batch(&codes(&["aaa", "aaa"]), coords())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.is_error()));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_page_released_on_every_exit_path() {
        let (service, _cache, _) = service_with(
            vec![
                ("aaa", Upstream::Menu(payload("aaa"))),
                ("bad", Upstream::Status(503)),
                ("junk", Upstream::Garbage),
            ],
            test_config(),
        );

        service
            .run_batch(&codes(&["aaa", "bad", "junk", "missing"]), coords())
            .await
            .unwrap();
        assert_eq!(service.renderer().active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_garbage_page_reports_extraction_error() {
        let (service, _cache, _) =
            service_with(vec![("junk", Upstream::Garbage)], test_config());

        let entries = service.run_batch(&codes(&["junk"]), coords()).await.unwrap();
        match &entries[0] {
            BatchEntry::Error { code, error } => {
                assert_eq!(code, "junk");
                assert!(error.contains("extract"), "unexpected error: {error}");
            }
            other => panic!("expected error entry, got {other:?}"),
        }
    }

    #[test]
    fn test_vendor_url_shape() {
        let (service, _cache, _) = service_with(vec![], test_config());
        let url = service.vendor_url("v9zk", coords()).unwrap();
        assert_eq!(url.host_str(), Some("tw.fd-api.com"));
        assert_eq!(url.path(), "/api/v5/vendors/v9zk");
        let query = url.query().unwrap();
        assert!(query.contains("include=menus"));
        assert!(query.contains("longitude=120.64"));
        assert!(query.contains("latitude=24.17"));
    }
}
