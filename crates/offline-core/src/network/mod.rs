//! Network access for intercepted requests.
//!
//! This module provides:
//! - The [`Fetcher`] trait through which the cache manager reaches the network
//! - An HTTP implementation backed by reqwest

mod client;
mod fetcher;

pub use client::HttpFetcher;
pub use fetcher::{DynFetcher, Fetcher};
