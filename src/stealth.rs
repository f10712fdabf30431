//! Per-page stealth profile.
//!
//! Everything that makes a page look like an attended browser session is
//! concentrated here: a realistic user agent and navigation header set,
//! the pre-obtained guest-session cookies scoped to the upstream host, a
//! new-document script that hides the usual automation markers, and
//! Fetch-domain interception that aborts resource classes the scrape
//! never needs (images, stylesheets, fonts, media, uncategorized).
//!
//! The upstream is adversarial and unversioned, so expect this module to
//! churn; nothing outside it depends on any of these details.

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, ErrorReason, Headers, ResourceType, SetCookiesParams, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::json;
use tracing::debug;

/// Fixed desktop Chrome user agent. Keep in lockstep with the header set
/// below — a UA/header mismatch is itself a bot signal.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9,zh-TW;q=0.8";

/// Patches evaluated before any page script runs: hide the webdriver flag
/// and fill in the plugin/language surfaces headless Chrome leaves empty.
const FINGERPRINT_PATCH: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
window.chrome = window.chrome || { runtime: {} };
"#;

/// Resource classes aborted before they load. Documents, scripts and
/// XHR/fetch must pass through or the payload never renders.
fn is_blocked(resource_type: &ResourceType) -> bool {
    matches!(
        resource_type,
        ResourceType::Image
            | ResourceType::Stylesheet
            | ResourceType::Font
            | ResourceType::Media
            | ResourceType::Other
    )
}

/// The evasion configuration applied to every page before navigation.
#[derive(Debug, Clone)]
pub struct StealthProfile {
    /// Host the session cookies are scoped to.
    pub host: String,
    /// Cookies applied as `(name, value)` pairs.
    pub cookies: Vec<(String, String)>,
}

impl StealthProfile {
    pub fn new(host: impl Into<String>, cookies: Vec<(String, String)>) -> Self {
        Self {
            host: host.into(),
            cookies,
        }
    }

    /// Apply the full profile to a fresh page. Must run before the first
    /// navigation; the fingerprint patch only affects documents loaded
    /// after it is registered.
    pub async fn apply(&self, page: &Page) -> Result<()> {
        page.execute(
            SetUserAgentOverrideParams::builder()
                .user_agent(USER_AGENT)
                .accept_language(ACCEPT_LANGUAGE)
                .platform("Win32")
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build UA override: {e}"))?,
        )
        .await
        .context("failed to set user agent")?;

        page.execute(SetExtraHttpHeadersParams::new(Headers::new(json!({
            "accept": "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            "accept-language": ACCEPT_LANGUAGE,
            "upgrade-insecure-requests": "1",
            "sec-fetch-site": "none",
            "sec-fetch-mode": "navigate",
            "sec-fetch-user": "?1",
            "sec-fetch-dest": "document",
        }))))
        .await
        .context("failed to set extra headers")?;

        if !self.cookies.is_empty() {
            let cookies = self
                .cookies
                .iter()
                .map(|(name, value)| {
                    CookieParam::builder()
                        .name(name.clone())
                        .value(value.clone())
                        .domain(self.host.clone())
                        .path("/")
                        .build()
                        .map_err(|e| anyhow::anyhow!("invalid cookie '{name}': {e}"))
                })
                .collect::<Result<Vec<_>>>()?;
            page.execute(SetCookiesParams::new(cookies))
                .await
                .context("failed to set session cookies")?;
        }

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            FINGERPRINT_PATCH,
        ))
        .await
        .context("failed to install fingerprint patch")?;

        self.install_resource_blocking(page).await?;

        debug!(host = %self.host, "stealth profile applied");
        Ok(())
    }

    /// Enable Fetch-domain interception and spawn the responder that
    /// aborts blocked resource classes and continues everything else.
    /// The responder exits when the page closes and its event stream ends.
    async fn install_resource_blocking(&self, page: &Page) -> Result<()> {
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .context("failed to listen for paused requests")?;

        page.execute(EnableParams::default())
            .await
            .context("failed to enable request interception")?;

        let tab = page.clone();
        tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                let outcome = if is_blocked(&event.resource_type) {
                    tab.execute(FailRequestParams::new(request_id, ErrorReason::Aborted))
                        .await
                        .map(|_| ())
                } else {
                    tab.execute(ContinueRequestParams::new(request_id))
                        .await
                        .map(|_| ())
                };
                if outcome.is_err() {
                    // Page is gone; nothing left to intercept.
                    break;
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_and_data_requests_pass() {
        assert!(!is_blocked(&ResourceType::Document));
        assert!(!is_blocked(&ResourceType::Script));
        assert!(!is_blocked(&ResourceType::Xhr));
        assert!(!is_blocked(&ResourceType::Fetch));
    }

    #[test]
    fn test_decoration_requests_are_blocked() {
        assert!(is_blocked(&ResourceType::Image));
        assert!(is_blocked(&ResourceType::Stylesheet));
        assert!(is_blocked(&ResourceType::Font));
        assert!(is_blocked(&ResourceType::Media));
        assert!(is_blocked(&ResourceType::Other));
    }

    #[test]
    fn test_fingerprint_patch_hides_webdriver() {
        assert!(FINGERPRINT_PATCH.contains("'webdriver'"));
        assert!(FINGERPRINT_PATCH.contains("undefined"));
    }

    #[test]
    fn test_profile_carries_host_scoped_cookies() {
        let profile = StealthProfile::new(
            "vendors.example",
            vec![("guest_id".into(), "abc123".into())],
        );
        assert_eq!(profile.host, "vendors.example");
        assert_eq!(profile.cookies.len(), 1);
    }
}
