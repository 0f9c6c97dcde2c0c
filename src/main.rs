//! Plin Web API Server
//!
//! Document management service with web page and PDF content extraction.
//!
//! Data lives in a SQLite database chosen with `--database-url`; access
//! tokens are signed with `PLIN_WEB_JWT_SECRET`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use plin_web::auth::AuthConfig;
use plin_web::cors::CorsConfig;
use plin_web::fetch::{FetchOptions, PageFetcher, WebScraper};
use plin_web::handlers::{router, AppState};
use plin_web::security::{SecurityConfig, SecurityLayer};
use plin_web::store::{Store, DEFAULT_DATABASE_URL};

/// Plin Web API Server
#[derive(Parser, Debug)]
#[command(name = "plin-web")]
#[command(version)]
#[command(about = "Document management API with web and PDF content extraction")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Host to bind to (defaults to 127.0.0.1, or 0.0.0.0 with PLIN_WEB_BIND_ALL=true)
    #[arg(short = 'H', long)]
    host: Option<IpAddr>,

    /// SQLite database URL, e.g. sqlite://plin-web.db or sqlite::memory:
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Timeout for fetching web pages, in seconds
    #[arg(long, default_value = "10")]
    fetch_timeout_secs: u64,

    /// Maximum PDF upload size, in MiB
    #[arg(long, default_value = "10")]
    max_upload_mb: usize,

    /// Extra CORS origin to allow besides localhost (repeatable)
    #[arg(long = "cors-origin")]
    cors_origins: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let security_config =
        SecurityConfig::from_env().context("Failed to load security configuration")?;
    let auth_config = AuthConfig::from_env().context("Failed to load auth configuration")?;

    let store = Store::connect(&args.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", args.database_url))?;

    let fetcher = PageFetcher::new(FetchOptions {
        timeout: Duration::from_secs(args.fetch_timeout_secs),
        ..Default::default()
    })?;
    let state = Arc::new(
        AppState::new(store, WebScraper::new(fetcher), &auth_config)
            .with_max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024)),
    );

    let cors = args
        .cors_origins
        .iter()
        .fold(CorsConfig::default(), |config, origin| {
            config.with_origin(origin.as_str())
        });

    let addr = match args.host {
        Some(host) => SocketAddr::new(host, args.port),
        None => security_config.socket_addr(args.port),
    };
    let security = SecurityLayer::new(security_config, state.authenticator()).bound_to(addr.ip());

    spawn_rate_limiter_cleanup(security.clone());

    let app = router(state, security, cors);

    info!("Plin Web API starting on {}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Plin Web API stopped");
    Ok(())
}

fn spawn_rate_limiter_cleanup(security: SecurityLayer) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = security.cleanup_rate_limiter().await;
            if removed > 0 {
                debug!("Dropped {} idle rate limit buckets", removed);
            }
        }
    });
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
