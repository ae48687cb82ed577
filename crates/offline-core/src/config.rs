//! Configuration for the offline cache.
//!
//! The cache version and the seed list are the two parameters that define a
//! deployment; everything else has a sensible default.

use crate::error::{OfflineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Built-in defaults.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const CACHE_VERSION: &'static str = "offline-cache-v1";
    pub const LIVE_PATTERN: &'static str = "/api/";
    pub const PLACEHOLDER_BODY: &'static str = "Offline";
    pub const SEED_PATHS: &'static [&'static str] = &[
        "/",
        "/index.html",
        "/style.css",
        "/script.js",
        "/manifest.json",
    ];
}

/// Runtime configuration of a cache manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct OfflineConfig {
    /// Name of the current cache store. Changing it retires every older store.
    pub cache_version: String,
    /// Paths fetched and stored on install, resolved against `origin`.
    pub seed_paths: Vec<String>,
    /// Requests whose path contains this segment always go to the network.
    pub live_pattern: String,
    /// Origin of the web application, e.g. `http://127.0.0.1:3000`.
    pub origin: Option<String>,
    /// Body of the response returned when the network is unreachable.
    pub placeholder_body: String,
    /// Optional timeout for origin requests. `None` waits indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            cache_version: CacheDefaults::CACHE_VERSION.to_string(),
            seed_paths: CacheDefaults::SEED_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            live_pattern: CacheDefaults::LIVE_PATTERN.to_string(),
            origin: None,
            placeholder_body: CacheDefaults::PLACEHOLDER_BODY.to_string(),
            request_timeout_secs: None,
        }
    }
}

impl OfflineConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| OfflineError::io_with_path(e, path))?;
        let config: OfflineConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Parsed application origin.
    pub fn origin_url(&self) -> Result<Url> {
        let raw = self.origin.as_deref().ok_or_else(|| OfflineError::Config {
            message: "no application origin configured".into(),
        })?;
        let url = Url::parse(raw).map_err(|e| OfflineError::InvalidUrl {
            url: raw.to_string(),
            message: e.to_string(),
        })?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(OfflineError::InvalidUrl {
                url: raw.to_string(),
                message: "origin must be an http(s) URL".into(),
            });
        }
        // Request and seed paths are absolute, so a path prefix would be lost.
        if url.path() != "/" {
            return Err(OfflineError::InvalidUrl {
                url: raw.to_string(),
                message: "origin must not have a path".into(),
            });
        }
        Ok(url)
    }

    /// Seed paths resolved against the origin, in declaration order.
    pub fn seed_urls(&self) -> Result<Vec<Url>> {
        let origin = self.origin_url()?;
        self.seed_paths
            .iter()
            .map(|path| {
                origin.join(path).map_err(|e| OfflineError::InvalidUrl {
                    url: path.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Check the values that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.cache_version.trim().is_empty() {
            return Err(OfflineError::Config {
                message: "cache_version must not be empty".into(),
            });
        }
        if self.live_pattern.is_empty() {
            return Err(OfflineError::Config {
                message: "live_pattern must not be empty".into(),
            });
        }
        self.seed_urls()?;
        Ok(())
    }
}
