//! Request handlers.
//!
//! Every request outside the reserved `/__offline/` prefix is converted into a
//! [`FetchRequest`] against the application origin and answered by the cache
//! manager once clients are claimed, or straight from the origin before that.

use crate::server::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use offline_cache::{Clients, FetchRequest, FetchResponse, Fetcher, OfflineError};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

/// Largest request body forwarded to the origin.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Cache status endpoint.
pub async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    match state.manager.status() {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            error!("Status query failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// Intercept a request bound for the application.
///
/// The body is buffered up to [`MAX_BODY_BYTES`]; an oversized body is
/// answered with `413`, a body that fails to arrive with `400`.
pub async fn handle_intercept(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejecting request body for {} {}: {}", method, uri, rejection);
            return rejection.into_response();
        }
    };
    let fetch_request = to_fetch_request(state.manager.origin(), method, &uri, headers, body);

    let result = if state.clients.is_controlled() {
        state.manager.handle_fetch(&fetch_request).await
    } else {
        debug!(
            "Not yet controlling clients, passing {} {} through",
            fetch_request.method, fetch_request.url
        );
        state.fetcher.fetch(&fetch_request).await
    };

    match result {
        Ok(response) => into_response(response),
        Err(e) => bad_gateway(&fetch_request, e),
    }
}

/// Rebuild an incoming request as a request to the origin.
fn to_fetch_request(
    origin: &Url,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> FetchRequest {
    // Keep the origin's scheme and authority; only path and query come from
    // the client, so a path like `//other.host/` cannot redirect the fetch.
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());

    FetchRequest {
        method,
        url,
        headers,
        body,
    }
}

fn into_response(response: FetchResponse) -> Response {
    (response.status, response.headers, Body::from(response.body)).into_response()
}

fn bad_gateway(request: &FetchRequest, e: OfflineError) -> Response {
    warn!("{} {} failed: {}", request.method, request.url, e);
    (StatusCode::BAD_GATEWAY, format!("Upstream unavailable: {}", e)).into_response()
}
