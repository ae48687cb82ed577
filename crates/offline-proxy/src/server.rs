//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_intercept, handle_status, MAX_BODY_BYTES};
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use offline_cache::{CacheManager, Clients, DynFetcher};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Prefix of the proxy's own endpoints; never forwarded to the origin.
pub const RESERVED_PREFIX: &str = "/__offline";

/// Application state shared across handlers.
pub struct AppState {
    /// Cache manager answering intercepted requests
    pub manager: Arc<CacheManager>,
    /// Network used directly while clients are not yet claimed
    pub fetcher: DynFetcher,
    /// Whether requests are routed through the manager
    pub clients: Arc<dyn Clients>,
}

/// Build the router for the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&format!("{}/health", RESERVED_PREFIX), get(handle_health))
        .route(&format!("{}/status", RESERVED_PREFIX), get(handle_status))
        .fallback(handle_intercept)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the proxy server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(state));

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Proxy listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
