//! Offline Cache - versioned offline response caching for web applications.
//!
//! A [`CacheManager`] sits between an application's clients and its origin.
//! It seeds a named cache store on install, sweeps stores of older versions on
//! activate, and answers every intercepted request from the store, the network
//! or a fixed offline placeholder.
//!
//! The host is abstracted behind three traits: [`CacheStorage`] for the named
//! stores, [`Fetcher`] for the network and [`Clients`] for taking control of
//! clients. The `offline-proxy` binary provides all three over HTTP.
//!
//! # Example
//!
//! ```rust,ignore
//! use offline_cache::{CacheManager, ClientGate, HttpFetcher, OfflineConfig, SqliteCacheStorage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> offline_cache::Result<()> {
//!     let mut config = OfflineConfig::default();
//!     config.origin = Some("http://127.0.0.1:3000".into());
//!
//!     let fetcher = HttpFetcher::new(config.origin_url()?)?;
//!     let manager = CacheManager::new(
//!         config,
//!         Arc::new(SqliteCacheStorage::new("offline-cache.sqlite")?),
//!         Arc::new(fetcher),
//!         Arc::new(ClientGate::new()),
//!     )?;
//!
//!     manager.install().await?;
//!     manager.activate().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod http;
pub mod manager;
pub mod network;

// Re-export commonly used types
pub use cache::{CacheStorage, SqliteCacheStorage};
pub use clients::{ClientGate, Clients};
pub use config::{CacheDefaults, OfflineConfig};
pub use error::{OfflineError, Result};
pub use crate::http::{FetchRequest, FetchResponse, RequestKey, ResponseType};
pub use manager::{ActivateReport, CacheManager, CacheStatus, InstallReport, WorkerState};
pub use network::{DynFetcher, Fetcher, HttpFetcher};
