//! Offline Proxy - keeps a web application usable without a network.
//!
//! Sits in front of the application's origin, seeds a versioned cache on
//! startup, and answers requests from the cache when the origin cannot.

mod handler;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use offline_cache::{
    CacheManager, ClientGate, HttpFetcher, OfflineConfig, SqliteCacheStorage,
};
use server::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "offline-proxy")]
#[command(about = "Offline caching proxy for a web application")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Origin of the application, e.g. http://127.0.0.1:3000
    #[arg(short, long)]
    upstream: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database holding the cache stores
    #[arg(long, default_value = "offline-cache.sqlite")]
    db_path: PathBuf,

    /// Override the cache version from the configuration
    #[arg(long)]
    cache_version: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// Configuration file (or defaults) with command line overrides applied.
    fn load_config(&self) -> Result<OfflineConfig> {
        let mut config = match &self.config {
            Some(path) => OfflineConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => OfflineConfig::default(),
        };

        if let Some(upstream) = &self.upstream {
            config.origin = Some(upstream.clone());
        }
        if let Some(version) = &self.cache_version {
            config.cache_version = version.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting offline proxy");

    let config = args.load_config()?;
    let origin = config.origin_url()?;
    info!("Origin: {}, cache version: {}", origin, config.cache_version);

    let storage = Arc::new(
        SqliteCacheStorage::new(&args.db_path)
            .with_context(|| format!("opening cache at {}", args.db_path.display()))?,
    );
    let fetcher = Arc::new(HttpFetcher::with_timeout(origin, config.request_timeout())?);
    let clients = Arc::new(ClientGate::new());

    let manager = Arc::new(CacheManager::new(
        config,
        storage,
        fetcher.clone(),
        clients.clone(),
    )?);

    // Lifecycle: each phase completes before requests are served.
    let report = manager.install().await?;
    if let Some(reason) = &report.seed_error {
        info!("Continuing without a complete seed: {}", reason);
    }
    if let Err(e) = manager.activate().await {
        error!("Activation failed, requests will bypass the cache: {}", e);
    }

    let state = AppState {
        manager,
        fetcher,
        clients,
    };
    let addr = server::start_server(state, &args.host, args.port).await?;

    // Print port for the parent process to read (intentional stdout)
    println!("PROXY_PORT={}", addr.port());

    info!("Offline proxy running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
