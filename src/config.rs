//! Service configuration.
//!
//! Defaults target the upstream storefront the service was built for and
//! can be overridden per deployment via `MENUD_*` environment variables or
//! CLI flags (flags win). Nothing here is hot-reloaded; the config is read
//! once at startup and shared behind the service context.

use crate::fetch::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP port, matching the service this replaces.
pub const DEFAULT_PORT: u16 = 3001;

/// Default upstream storefront host.
pub const DEFAULT_UPSTREAM_HOST: &str = "tw.fd-api.com";

/// Default cache TTL: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default bound on concurrently open browser pages per batch.
pub const DEFAULT_FAN_OUT: usize = 8;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the HTTP API.
    pub port: u16,
    /// Upstream storefront host (the `{host}` in the vendor URL).
    pub upstream_host: String,
    /// Path to the SQLite menu cache.
    pub db_path: PathBuf,
    /// Cache time-to-live.
    pub ttl: Duration,
    /// Maximum concurrently open pages per batch.
    pub fan_out: usize,
    /// Retry/backoff policy for page navigation.
    pub retry: RetryPolicy,
    /// Explicit Chromium binary path (otherwise discovered).
    pub chromium_path: Option<PathBuf>,
    /// Pre-obtained session cookies applied to every page, scoped to
    /// `upstream_host`. Format of the env override: `name=value; name2=value2`.
    pub session_cookies: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            upstream_host: DEFAULT_UPSTREAM_HOST.to_string(),
            db_path: default_db_path(),
            ttl: DEFAULT_TTL,
            fan_out: DEFAULT_FAN_OUT,
            retry: RetryPolicy::default(),
            chromium_path: None,
            session_cookies: default_session_cookies(),
        }
    }
}

impl Config {
    /// Build a config from defaults plus `MENUD_*` environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(port) = std::env::var("MENUD_PORT") {
            if let Ok(p) = port.parse() {
                cfg.port = p;
            }
        }
        if let Ok(host) = std::env::var("MENUD_UPSTREAM_HOST") {
            if !host.trim().is_empty() {
                cfg.upstream_host = host.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("MENUD_DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        if let Ok(hours) = std::env::var("MENUD_CACHE_TTL_HOURS") {
            if let Ok(h) = hours.parse::<u64>() {
                cfg.ttl = Duration::from_secs(h * 3600);
            }
        }
        if let Ok(n) = std::env::var("MENUD_FAN_OUT") {
            if let Ok(n) = n.parse::<usize>() {
                cfg.fan_out = n.max(1);
            }
        }
        if let Ok(p) = std::env::var("MENUD_CHROMIUM_PATH") {
            cfg.chromium_path = Some(PathBuf::from(p));
        }
        if let Ok(raw) = std::env::var("MENUD_SESSION_COOKIES") {
            let parsed = parse_cookie_pairs(&raw);
            if !parsed.is_empty() {
                cfg.session_cookies = parsed;
            }
        }

        cfg
    }
}

/// `~/.menud/menus.db`, falling back to /tmp when no home dir exists.
fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".menud")
        .join("menus.db")
}

/// Baseline guest-session cookies the upstream sets for first-time browser
/// visitors. Refresh these when the upstream rotates its session scheme.
fn default_session_cookies() -> Vec<(String, String)> {
    vec![
        ("hl".to_string(), "en".to_string()),
        (
            "dhhPerseusGuestId".to_string(),
            "1796920945.8213098422.mJhTr0uQyZ".to_string(),
        ),
    ]
}

/// Parse `name=value; name2=value2` into pairs, skipping malformed parts.
pub fn parse_cookie_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
