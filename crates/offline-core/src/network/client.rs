//! HTTP fetcher backed by reqwest.
//!
//! Forwards intercepted requests to the application origin and buffers the
//! complete response so it can be both returned and stored.

use super::fetcher::Fetcher;
use crate::http::{strip_hop_by_hop, FetchRequest, FetchResponse, ResponseType};
use crate::{OfflineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Fetcher that talks to the network over HTTP.
pub struct HttpFetcher {
    client: Client,
    /// Origin of the application; responses from it are `Basic`.
    origin: Url,
}

impl HttpFetcher {
    /// Create a fetcher for `origin` without a request timeout.
    pub fn new(origin: Url) -> Result<Self> {
        Self::with_timeout(origin, None)
    }

    /// Create a fetcher with an optional per-request timeout.
    pub fn with_timeout(origin: Url, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            "offline-cache/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| OfflineError::Network {
            message: "Failed to create HTTP client".to_string(),
            cause: Some(e.to_string()),
        })?;

        Ok(Self { client, origin })
    }

    /// Origin this fetcher treats as same-origin.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Classify a response by the URL it was finally served from.
    pub fn classify(&self, final_url: &Url) -> ResponseType {
        if final_url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut headers = request.headers.clone();
        strip_hop_by_hop(&mut headers);

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            OfflineError::from(e).with_context(format!("{} {}", request.method, request.url))
        })?;

        let status = response.status();
        let final_url = response.url().clone();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let body = response
            .bytes()
            .await
            .map_err(|e| OfflineError::from(e).with_context(format!("reading body of {}", final_url)))?;

        debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.url,
            status,
            body.len()
        );

        Ok(FetchResponse {
            status,
            headers,
            body,
            response_type: self.classify(&final_url),
            url: Some(final_url),
        })
    }
}
