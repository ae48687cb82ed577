//! Fetcher trait.

use crate::error::Result;
use crate::http::{FetchRequest, FetchResponse};
use async_trait::async_trait;

/// Issues requests to the network.
///
/// A response with any status is a success; only a failure to obtain a
/// response at all (connection refused, DNS failure, reset) is an error, and
/// implementations report it as [`crate::OfflineError::Network`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Shared handle to any fetcher.
pub type DynFetcher = std::sync::Arc<dyn Fetcher>;
