use anyhow::{Context, Result};
use clap::Parser;
use menud::cache::MenuCache;
use menud::config::Config;
use menud::renderer::chromium::ChromiumRenderer;
use menud::renderer::Renderer;
use menud::server::{self, AppState};
use menud::service::MenuService;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "menud",
    about = "Vendor menu scraping and caching service",
    version
)]
struct Cli {
    /// Port for the HTTP API
    #[arg(long, env = "MENUD_PORT")]
    port: Option<u16>,

    /// Upstream storefront host
    #[arg(long, env = "MENUD_UPSTREAM_HOST")]
    upstream_host: Option<String>,

    /// Path to the SQLite menu cache
    #[arg(long, env = "MENUD_DB_PATH")]
    db: Option<PathBuf>,

    /// Cache TTL in hours
    #[arg(long, env = "MENUD_CACHE_TTL_HOURS")]
    ttl_hours: Option<u64>,

    /// Maximum concurrently open browser pages per batch
    #[arg(long, env = "MENUD_FAN_OUT")]
    fan_out: Option<usize>,

    /// Explicit Chromium binary path
    #[arg(long, env = "MENUD_CHROMIUM_PATH")]
    chromium: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut cfg = Config::from_env();
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(host) = self.upstream_host {
            cfg.upstream_host = host;
        }
        if let Some(db) = self.db {
            cfg.db_path = db;
        }
        if let Some(hours) = self.ttl_hours {
            cfg.ttl = std::time::Duration::from_secs(hours * 3600);
        }
        if let Some(fan_out) = self.fan_out {
            cfg.fan_out = fan_out.max(1);
        }
        if let Some(chromium) = self.chromium {
            cfg.chromium_path = Some(chromium);
        }
        cfg
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cfg = cli.into_config();
    info!(
        port = cfg.port,
        upstream = %cfg.upstream_host,
        db = %cfg.db_path.display(),
        "starting menud"
    );

    // Browser and cache failures here are fatal: the service cannot run
    // without either.
    let renderer: Arc<dyn Renderer> = Arc::new(
        ChromiumRenderer::launch(&cfg)
            .await
            .context("browser startup failed")?,
    );
    let cache = Arc::new(
        MenuCache::open(&cfg.db_path, cfg.ttl).context("menu cache startup failed")?,
    );

    let state = Arc::new(AppState {
        service: MenuService::new(Arc::clone(&renderer), cache, &cfg),
        started_at: Instant::now(),
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {e}");
        }
        info!("shutdown signal received");
    };

    server::start(cfg.port, state, shutdown).await?;

    // In-flight pages are not drained; closing the browser aborts them.
    renderer.shutdown().await?;
    info!("menud stopped");
    Ok(())
}
