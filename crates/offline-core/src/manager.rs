//! CacheManager - versioned offline caching for a web application.
//!
//! Reacts to the three lifecycle signals delivered by the host:
//! - install: open the current store and seed it
//! - activate: delete every store of an older version, then claim clients
//! - fetch: serve from the store, fall back to the network, store successes

use crate::cache::CacheStorage;
use crate::clients::Clients;
use crate::config::OfflineConfig;
use crate::http::{FetchRequest, FetchResponse, RequestKey};
use crate::network::DynFetcher;
use crate::{OfflineError, Result};
use futures::future::try_join_all;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle state of a cache manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Created, no lifecycle signal received yet.
    Parsed = 0,
    Installing = 1,
    Installed = 2,
    Activating = 3,
    /// Old stores swept and clients claimed.
    Activated = 4,
    /// Activation failed; this manager will not take control.
    Redundant = 5,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Atomic wrapper for WorkerState.
struct AtomicWorkerState(AtomicU8);

impl AtomicWorkerState {
    fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> WorkerState {
        match self.0.load(Ordering::SeqCst) {
            0 => WorkerState::Parsed,
            1 => WorkerState::Installing,
            2 => WorkerState::Installed,
            3 => WorkerState::Activating,
            4 => WorkerState::Activated,
            _ => WorkerState::Redundant,
        }
    }

    fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Outcome of an install.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    /// Store that was opened.
    pub cache_name: String,
    /// Whether the store was created by this install.
    pub created: bool,
    /// Number of seed resources stored.
    pub seeded: usize,
    /// Why seeding failed, if it did. Installation completes either way.
    pub seed_error: Option<String>,
}

/// Outcome of an activation.
#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub cache_name: String,
    /// Stale stores that were deleted.
    pub deleted: Vec<String>,
}

/// Point-in-time view of the manager, for the host's status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub cache_version: String,
    pub state: WorkerState,
    pub controlled: bool,
    pub stores: Vec<String>,
    pub entries: usize,
}

/// Versioned offline cache for one web application.
///
/// The only state shared between concurrent fetches is the storage, whose
/// individual operations are atomic. No locking happens here.
pub struct CacheManager {
    config: OfflineConfig,
    origin: Url,
    storage: Arc<dyn CacheStorage>,
    fetcher: DynFetcher,
    clients: Arc<dyn Clients>,
    state: AtomicWorkerState,
}

impl CacheManager {
    /// Create a manager. Fails if the configuration is invalid.
    pub fn new(
        config: OfflineConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: DynFetcher,
        clients: Arc<dyn Clients>,
    ) -> Result<Self> {
        config.validate()?;
        let origin = config.origin_url()?;

        Ok(Self {
            config,
            origin,
            storage,
            fetcher,
            clients,
            state: AtomicWorkerState::new(WorkerState::Parsed),
        })
    }

    /// Name of the current store.
    pub fn cache_name(&self) -> &str {
        &self.config.cache_version
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn state(&self) -> WorkerState {
        self.state.load()
    }

    /// Whether requests for `url` bypass the cache entirely.
    pub fn is_live(&self, url: &Url) -> bool {
        url.path().contains(self.config.live_pattern.as_str())
    }

    /// Handle the install signal.
    ///
    /// Opens the current store and seeds it. A seeding failure is logged and
    /// reported but does not fail the install; only a storage error opening
    /// the store does.
    pub async fn install(&self) -> Result<InstallReport> {
        self.state.store(WorkerState::Installing);
        let name = self.cache_name().to_string();
        info!("Installing cache '{}'", name);

        let created = match self.storage.open(&name) {
            Ok(created) => created,
            Err(e) => {
                self.state.store(WorkerState::Redundant);
                return Err(e);
            }
        };

        let report = match self.seed(&name).await {
            Ok(seeded) => {
                info!("Seeded {} resources into '{}'", seeded, name);
                InstallReport {
                    cache_name: name,
                    created,
                    seeded,
                    seed_error: None,
                }
            }
            Err(e) => {
                warn!("Seeding '{}' failed: {}", name, e);
                InstallReport {
                    cache_name: name,
                    created,
                    seeded: 0,
                    seed_error: Some(e.to_string()),
                }
            }
        };

        self.state.store(WorkerState::Installed);
        Ok(report)
    }

    /// Fetch every seed resource, then store them in one batch.
    async fn seed(&self, name: &str) -> Result<usize> {
        let requests: Vec<FetchRequest> = self
            .config
            .seed_urls()?
            .into_iter()
            .map(FetchRequest::get)
            .collect();

        let responses =
            try_join_all(requests.iter().map(|request| self.fetch_seed(name, request))).await?;

        let entries: Vec<(RequestKey, FetchResponse)> = requests
            .iter()
            .map(FetchRequest::key)
            .zip(responses)
            .collect();

        self.storage.put_all(name, &entries)?;
        Ok(entries.len())
    }

    async fn fetch_seed(&self, name: &str, request: &FetchRequest) -> Result<FetchResponse> {
        let seed_failed = |message: String| OfflineError::SeedFailed {
            cache: name.to_string(),
            url: request.url.to_string(),
            message,
        };

        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| seed_failed(e.to_string()))?;

        if !response.status.is_success() {
            return Err(seed_failed(format!("status {}", response.status)));
        }

        Ok(response)
    }

    /// Handle the activate signal.
    ///
    /// Deletes every store except the current one, then claims the clients.
    /// Every deletion is attempted; if any fails the first error is returned
    /// and clients are not claimed.
    pub async fn activate(&self) -> Result<ActivateReport> {
        self.state.store(WorkerState::Activating);
        let current = self.cache_name().to_string();

        let deleted = match self.sweep(&current) {
            Ok(deleted) => deleted,
            Err(e) => {
                self.state.store(WorkerState::Redundant);
                return Err(e);
            }
        };

        if let Err(e) = self.clients.claim() {
            self.state.store(WorkerState::Redundant);
            return Err(e);
        }

        self.state.store(WorkerState::Activated);
        info!(
            "Activated cache '{}' ({} stale stores removed)",
            current,
            deleted.len()
        );

        Ok(ActivateReport {
            cache_name: current,
            deleted,
        })
    }

    fn sweep(&self, current: &str) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        let mut first_error = None;

        for name in self.storage.keys()? {
            if name == current {
                continue;
            }
            match self.storage.delete(&name) {
                Ok(_) => {
                    debug!("Deleted stale cache '{}'", name);
                    deleted.push(name);
                }
                Err(e) => {
                    warn!("Failed to delete stale cache '{}': {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    /// Handle one intercepted request.
    ///
    /// Live requests go straight to the network and a network failure is
    /// returned as an error. Every other request gets a response: from the
    /// store, from the network, or the offline placeholder.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        if self.is_live(&request.url) {
            debug!("Live request {} {}", request.method, request.url);
            return self.fetcher.fetch(request).await;
        }

        let key = request.key();
        let name = self.cache_name();

        match self.storage.match_request(name, &key) {
            Ok(Some(hit)) => {
                debug!("Cache hit: {}", key);
                return Ok(hit);
            }
            Ok(None) => debug!("Cache miss: {}", key),
            Err(e) => warn!("Cache lookup for {} failed, treating as miss: {}", key, e),
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if key.is_cacheable() && response.is_storable() {
                    let copy = response.clone();
                    if let Err(e) = self.storage.put(name, &key, &copy) {
                        warn!("Failed to store {}: {}", key, e);
                    }
                }
                Ok(response)
            }
            Err(e) => {
                warn!("Network failed for {}, serving placeholder: {}", key, e);
                Ok(FetchResponse::offline_placeholder(
                    &self.config.placeholder_body,
                ))
            }
        }
    }

    /// Snapshot for status reporting.
    pub fn status(&self) -> Result<CacheStatus> {
        Ok(CacheStatus {
            cache_version: self.cache_name().to_string(),
            state: self.state(),
            controlled: self.clients.is_controlled(),
            stores: self.storage.keys()?,
            entries: self.storage.entry_count(self.cache_name())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SqliteCacheStorage;
    use crate::clients::ClientGate;
    use crate::http::ResponseType;
    use crate::network::Fetcher;
    use async_trait::async_trait;
    use http::{Method, StatusCode};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex;

    const ORIGIN: &str = "http://app.test";

    /// Fetcher serving canned responses by URL, with a switch to go offline.
    #[derive(Default)]
    struct StubFetcher {
        routes: Mutex<HashMap<String, FetchResponse>>,
        calls: AtomicUsize,
        offline: AtomicBool,
    }

    impl StubFetcher {
        fn route(&self, path: &str, response: FetchResponse) {
            let url = Url::parse(ORIGIN).unwrap().join(path).unwrap();
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), response);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(OfflineError::network("connection refused"));
            }
            Ok(self
                .routes
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .unwrap_or_else(|| FetchResponse::new(StatusCode::NOT_FOUND, "not found")))
        }
    }

    /// Storage whose deletes always fail.
    struct UndeletableStorage(SqliteCacheStorage);

    impl CacheStorage for UndeletableStorage {
        fn open(&self, name: &str) -> Result<bool> {
            self.0.open(name)
        }
        fn has(&self, name: &str) -> Result<bool> {
            self.0.has(name)
        }
        fn keys(&self) -> Result<Vec<String>> {
            self.0.keys()
        }
        fn delete(&self, _name: &str) -> Result<bool> {
            Err(OfflineError::Other("disk is read-only".into()))
        }
        fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<FetchResponse>> {
            self.0.match_request(name, key)
        }
        fn put(&self, name: &str, key: &RequestKey, response: &FetchResponse) -> Result<()> {
            self.0.put(name, key, response)
        }
        fn put_all(&self, name: &str, entries: &[(RequestKey, FetchResponse)]) -> Result<()> {
            self.0.put_all(name, entries)
        }
        fn entry_count(&self, name: &str) -> Result<usize> {
            self.0.entry_count(name)
        }
    }

    /// Storage whose lookups and writes always fail.
    struct BrokenStorage(SqliteCacheStorage);

    impl CacheStorage for BrokenStorage {
        fn open(&self, name: &str) -> Result<bool> {
            self.0.open(name)
        }
        fn has(&self, name: &str) -> Result<bool> {
            self.0.has(name)
        }
        fn keys(&self) -> Result<Vec<String>> {
            self.0.keys()
        }
        fn delete(&self, name: &str) -> Result<bool> {
            self.0.delete(name)
        }
        fn match_request(&self, _name: &str, _key: &RequestKey) -> Result<Option<FetchResponse>> {
            Err(OfflineError::Other("database is locked".into()))
        }
        fn put(&self, _name: &str, _key: &RequestKey, _response: &FetchResponse) -> Result<()> {
            Err(OfflineError::Other("disk is full".into()))
        }
        fn put_all(&self, name: &str, entries: &[(RequestKey, FetchResponse)]) -> Result<()> {
            self.0.put_all(name, entries)
        }
        fn entry_count(&self, name: &str) -> Result<usize> {
            self.0.entry_count(name)
        }
    }

    fn config(version: &str, seeds: &[&str]) -> OfflineConfig {
        OfflineConfig {
            cache_version: version.to_string(),
            seed_paths: seeds.iter().map(|s| s.to_string()).collect(),
            origin: Some(ORIGIN.to_string()),
            ..OfflineConfig::default()
        }
    }

    fn ok(body: &str) -> FetchResponse {
        FetchResponse::new(StatusCode::OK, body.to_string())
    }

    fn get(path: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
    }

    struct Harness {
        manager: CacheManager,
        storage: Arc<SqliteCacheStorage>,
        fetcher: Arc<StubFetcher>,
        clients: Arc<ClientGate>,
    }

    fn harness_with(config: OfflineConfig, storage: Arc<SqliteCacheStorage>) -> Harness {
        let fetcher = Arc::new(StubFetcher::default());
        fetcher.route("/", ok("<html>root</html>"));
        fetcher.route("/index.html", ok("<html>index</html>"));
        fetcher.route("/style.css", ok("body {}"));
        let clients = Arc::new(ClientGate::new());
        let manager = CacheManager::new(
            config,
            storage.clone(),
            fetcher.clone(),
            clients.clone(),
        )
        .unwrap();
        Harness {
            manager,
            storage,
            fetcher,
            clients,
        }
    }

    fn harness(config: OfflineConfig) -> Harness {
        harness_with(config, Arc::new(SqliteCacheStorage::open_in_memory().unwrap()))
    }

    #[test]
    fn test_rejects_config_without_origin() {
        let result = CacheManager::new(
            OfflineConfig::default(),
            Arc::new(SqliteCacheStorage::open_in_memory().unwrap()),
            Arc::new(StubFetcher::default()),
            Arc::new(ClientGate::new()),
        );
        assert!(matches!(result, Err(OfflineError::Config { .. })));
    }

    #[tokio::test]
    async fn test_install_seeds_every_resource() {
        let h = harness(config("v1", &["/", "/index.html", "/style.css"]));

        let report = h.manager.install().await.unwrap();
        assert!(report.created);
        assert_eq!(report.seeded, 3);
        assert!(report.seed_error.is_none());
        assert_eq!(h.manager.state(), WorkerState::Installed);

        for path in ["/", "/index.html", "/style.css"] {
            let hit = h.storage.match_request("v1", &get(path).key()).unwrap();
            assert!(hit.is_some(), "{} should be seeded", path);
        }
    }

    #[tokio::test]
    async fn test_failed_seed_stores_nothing_but_install_completes() {
        let h = harness(config("v1", &["/", "/missing.js", "/style.css"]));

        let report = h.manager.install().await.unwrap();
        assert_eq!(report.seeded, 0);
        assert!(report.seed_error.unwrap().contains("/missing.js"));
        assert_eq!(h.manager.state(), WorkerState::Installed);

        assert!(h.storage.has("v1").unwrap());
        assert_eq!(h.storage.entry_count("v1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_install_is_swallowed() {
        let h = harness(config("v1", &["/"]));
        h.fetcher.go_offline();

        let report = h.manager.install().await.unwrap();
        assert!(report.seed_error.is_some());
        assert_eq!(h.manager.state(), WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_activate_removes_stale_stores_and_claims() {
        let h = harness(config("v2", &["/"]));
        h.storage.open("v0").unwrap();
        h.storage.put("v1", &get("/").key(), &ok("old")).unwrap();

        h.manager.install().await.unwrap();
        assert!(!h.clients.is_controlled());

        let report = h.manager.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["v0", "v1"]);
        assert_eq!(h.storage.keys().unwrap(), vec!["v2"]);
        assert!(h.clients.is_controlled());
        assert_eq!(h.manager.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_deletion_failure_propagates() {
        let inner = SqliteCacheStorage::open_in_memory().unwrap();
        inner.open("v1").unwrap();
        let storage = Arc::new(UndeletableStorage(inner));
        let clients = Arc::new(ClientGate::new());
        let manager = CacheManager::new(
            config("v2", &[]),
            storage.clone(),
            Arc::new(StubFetcher::default()),
            clients.clone(),
        )
        .unwrap();

        manager.install().await.unwrap();
        assert!(manager.activate().await.is_err());
        assert_eq!(manager.state(), WorkerState::Redundant);
        assert!(!clients.is_controlled());
        assert_eq!(storage.keys().unwrap(), vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn test_storage_failures_do_not_change_the_response() {
        let fetcher = Arc::new(StubFetcher::default());
        fetcher.route("/about.html", ok("<html>about</html>"));
        let storage = Arc::new(BrokenStorage(SqliteCacheStorage::open_in_memory().unwrap()));
        let manager = CacheManager::new(
            config("v1", &[]),
            storage.clone(),
            fetcher.clone(),
            Arc::new(ClientGate::new()),
        )
        .unwrap();
        manager.install().await.unwrap();
        manager.activate().await.unwrap();

        // Failed lookup falls through to the network; failed put is dropped.
        for expected_calls in 1..=2 {
            let response = manager.handle_fetch(&get("/about.html")).await.unwrap();
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(&response.body[..], b"<html>about</html>");
            assert_eq!(fetcher.calls(), expected_calls);
        }
        assert_eq!(storage.entry_count("v1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_while_offline_serves_placeholder() {
        let fetcher = Arc::new(StubFetcher::default());
        let manager = CacheManager::new(
            config("v1", &[]),
            Arc::new(BrokenStorage(SqliteCacheStorage::open_in_memory().unwrap())),
            fetcher.clone(),
            Arc::new(ClientGate::new()),
        )
        .unwrap();
        fetcher.go_offline();

        let response = manager.handle_fetch(&get("/about.html")).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_live_requests_bypass_the_store() {
        let h = harness(config("v1", &[]));
        h.fetcher.route("/api/analysis", ok("[{\"ticker\":\"PETR4\"}]"));
        // Even a stored entry must not be served for a live path.
        h.storage
            .put("v1", &get("/api/analysis").key(), &ok("stale"))
            .unwrap();

        let response = h.manager.handle_fetch(&get("/api/analysis")).await.unwrap();
        assert_eq!(&response.body[..], b"[{\"ticker\":\"PETR4\"}]");
        assert_eq!(h.fetcher.calls(), 1);

        h.fetcher.route("/api/quotes", ok("[]"));
        h.manager.handle_fetch(&get("/api/quotes")).await.unwrap();
        assert_eq!(h.fetcher.calls(), 2);
        assert!(h
            .storage
            .match_request("v1", &get("/api/quotes").key())
            .unwrap()
            .is_none());
        assert_eq!(h.storage.entry_count("v1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_live_network_failure_is_an_error() {
        let h = harness(config("v1", &[]));
        h.fetcher.go_offline();

        let err = h
            .manager
            .handle_fetch(&get("/api/analysis"))
            .await
            .unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_hit_is_served_without_network() {
        let h = harness(config("v1", &[]));
        let stored = ok("cached copy");
        h.storage.put("v1", &get("/index.html").key(), &stored).unwrap();

        let response = h.manager.handle_fetch(&get("/index.html")).await.unwrap();
        assert_eq!(&response.body[..], b"cached copy");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_is_fetched_and_stored() {
        let h = harness(config("v1", &[]));

        let response = h.manager.handle_fetch(&get("/style.css")).await.unwrap();
        assert_eq!(&response.body[..], b"body {}");
        assert_eq!(h.fetcher.calls(), 1);

        let stored = h
            .storage
            .match_request("v1", &get("/style.css").key())
            .unwrap()
            .unwrap();
        assert_eq!(stored.body, response.body);

        // Second request is a hit.
        h.manager.handle_fetch(&get("/style.css")).await.unwrap();
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_serves_placeholder() {
        let h = harness(config("v1", &[]));
        h.fetcher.go_offline();

        let response = h.manager.handle_fetch(&get("/about.html")).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&response.body[..], b"Offline");
        assert_eq!(h.storage.entry_count("v1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unstorable_responses_are_returned_not_stored() {
        let h = harness(config("v1", &[]));
        h.fetcher.route(
            "/cdn.js",
            ok("cross").with_type(ResponseType::Cors),
        );
        h.fetcher.route(
            "/opaque.png",
            ok("opaque").with_type(ResponseType::Opaque),
        );

        let missing = h.manager.handle_fetch(&get("/nope.html")).await.unwrap();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        let cors = h.manager.handle_fetch(&get("/cdn.js")).await.unwrap();
        assert_eq!(&cors.body[..], b"cross");
        h.manager.handle_fetch(&get("/opaque.png")).await.unwrap();

        assert_eq!(h.storage.entry_count("v1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_get_requests_are_not_stored() {
        let h = harness(config("v1", &[]));
        h.fetcher.route("/contact", ok("thanks"));

        let mut request = get("/contact");
        request.method = Method::POST;
        request.body = "name=ana".into();

        let response = h.manager.handle_fetch(&request).await.unwrap();
        assert_eq!(&response.body[..], b"thanks");
        h.manager.handle_fetch(&request).await.unwrap();

        assert_eq!(h.fetcher.calls(), 2);
        assert_eq!(h.storage.entry_count("v1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_version_change_retires_previous_entries() {
        let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());

        let first = harness_with(config("v1", &["/", "/index.html"]), storage.clone());
        first.manager.install().await.unwrap();
        first.manager.activate().await.unwrap();
        first.manager.handle_fetch(&get("/style.css")).await.unwrap();
        assert_eq!(storage.entry_count("v1").unwrap(), 3);

        let second = harness_with(config("v2", &["/"]), storage.clone());
        second.manager.install().await.unwrap();
        second.manager.activate().await.unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["v2"]);
        assert_eq!(storage.entry_count("v1").unwrap(), 0);
        assert_eq!(storage.entry_count("v2").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_are_independent() {
        let h = harness(config("v1", &[]));
        for i in 0..8 {
            h.fetcher.route(&format!("/page-{}.html", i), ok(&format!("page {}", i)));
        }

        let requests: Vec<FetchRequest> =
            (0..8).map(|i| get(&format!("/page-{}.html", i))).collect();
        let responses =
            futures::future::join_all(requests.iter().map(|r| h.manager.handle_fetch(r))).await;

        for (i, response) in responses.into_iter().enumerate() {
            assert_eq!(response.unwrap().body, format!("page {}", i).into_bytes());
        }
        assert_eq!(h.storage.entry_count("v1").unwrap(), 8);
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let h = harness(config("v1", &["/"]));
        h.manager.install().await.unwrap();
        h.manager.activate().await.unwrap();

        let status = h.manager.status().unwrap();
        assert_eq!(status.cache_version, "v1");
        assert_eq!(status.state, WorkerState::Activated);
        assert!(status.controlled);
        assert_eq!(status.stores, vec!["v1"]);
        assert_eq!(status.entries, 1);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "activated");
    }

    #[test]
    fn test_live_pattern_matches_path_segment() {
        let h = harness(config("v1", &[]));
        let url = |s: &str| Url::parse(s).unwrap();

        assert!(h.manager.is_live(&url("http://app.test/api/analysis")));
        assert!(h.manager.is_live(&url("http://app.test/v2/api/x?y=1")));
        assert!(!h.manager.is_live(&url("http://app.test/apidocs.html")));
        assert!(!h.manager.is_live(&url("http://app.test/index.html?next=/api/")));
    }
}
