//! The service worker: lifecycle handlers, fetch routing, strategies.
//!
//! One strategy serves each intercepted request:
//!
//! | class            | strategy                                  |
//! |------------------|-------------------------------------------|
//! | worker script    | network only                              |
//! | navigation       | preload → cache → network → offline page  |
//! | `/api/` prefix   | network-first, async write-back           |
//! | core asset       | cache-first, no write-back                |
//! | dynamic asset    | stale-while-revalidate                    |
//! | other GET        | network, offline page for HTML on failure |
//!
//! Nothing propagates past a handler entry point: every failure path
//! ends in a fallback response or a logged `None`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::StatusCode;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheStorage};
use crate::clients::{ClientMessage, Clients};
use crate::config::WorkerConfig;
use crate::fetch::{
    classify, FetchRequest, FetchResponse, Fetcher, RequestClass, ResponseSource,
};
use crate::lifecycle::{WorkerLifecycle, WorkerState};
use crate::{Result, SwError};

/// An intercepted fetch, as delivered by the platform.
#[derive(Debug)]
pub struct FetchEvent {
    /// The request being served.
    pub request: FetchRequest,

    /// ID of the page that issued the request, when known.
    pub client_id: Option<String>,

    /// Navigation-preload response already in flight, if the platform
    /// started one.
    pub preload: Option<FetchResponse>,
}

impl FetchEvent {
    /// Wrap a request in an event with no preload.
    pub fn new(request: FetchRequest) -> Self {
        Self {
            request,
            client_id: None,
            preload: None,
        }
    }

    /// Attach a preload response.
    pub fn with_preload(mut self, response: FetchResponse) -> Self {
        self.preload = Some(response);
        self
    }
}

/// The offline cache engine.
///
/// Generic over the [`Fetcher`] so hosts and tests supply their own
/// network edge. All shared state lives behind `Arc<RwLock<..>>`;
/// handlers are `&self` and may run interleaved.
pub struct ServiceWorker<F: Fetcher> {
    config: Arc<WorkerConfig>,
    fetcher: Arc<F>,
    caches: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<Clients>>,
    lifecycle: RwLock<WorkerLifecycle>,
    preload_enabled: AtomicBool,
}

impl<F: Fetcher> ServiceWorker<F> {
    /// Create a worker. Fails if the asset manifest is inconsistent.
    pub fn new(config: WorkerConfig, fetcher: F) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            caches: Arc::new(RwLock::new(CacheStorage::new())),
            clients: Arc::new(RwLock::new(Clients::new())),
            lifecycle: RwLock::new(WorkerLifecycle::new()),
            preload_enabled: AtomicBool::new(false),
        })
    }

    /// The worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The network edge.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        self.lifecycle.read().await.state()
    }

    /// Names of all existing cache buckets.
    pub async fn bucket_names(&self) -> Vec<String> {
        self.caches.read().await.keys()
    }

    /// Look up a key in the current-version bucket.
    pub async fn cached(&self, key: &str) -> Option<FetchResponse> {
        self.caches
            .read()
            .await
            .get(&self.config.cache_name())
            .and_then(|bucket| bucket.match_key(key))
            .map(CacheEntry::to_response)
    }

    /// Register a page with the worker. The returned receiver yields
    /// messages broadcast to the page once it is claimed.
    pub async fn connect_client(
        &self,
        url: Url,
    ) -> (String, mpsc::UnboundedReceiver<ClientMessage>) {
        self.clients.write().await.connect(url)
    }

    // ==================== Install ====================

    /// Install handler: cache all core assets atomically, then the
    /// dynamic and optional assets best-effort.
    pub async fn install(&self) -> Result<()> {
        self.lifecycle.write().await.begin_install()?;

        if let Err(err) = self.install_core().await {
            self.lifecycle.write().await.install_failed();
            warn!(error = %err, "install aborted, worker is redundant");
            return Err(err);
        }

        for path in &self.config.dynamic_assets {
            if let Err(err) = self.fetch_and_store(path).await {
                warn!(%path, error = %err, "dynamic asset precache failed");
            }
        }
        for path in &self.config.optional_assets {
            if let Err(err) = self.fetch_and_store(path).await {
                debug!(%path, error = %err, "optional asset skipped");
            }
        }

        let activate_now = { self.lifecycle.write().await.install_succeeded()? };
        if activate_now {
            debug!("skip-waiting was latched during install, activating now");
            self.activate().await?;
        }
        Ok(())
    }

    /// Fetch every core asset before touching storage, so a failure
    /// leaves no partially filled bucket behind.
    async fn install_core(&self) -> Result<()> {
        let mut entries = Vec::with_capacity(self.config.core_assets.len());
        for path in &self.config.core_assets {
            let request = self.asset_request(path)?;
            let response = self.fetcher.fetch(&request).await.map_err(|err| {
                SwError::Install(format!("core asset {}: {}", path, err))
            })?;
            if !response.is_success() {
                return Err(SwError::Install(format!(
                    "core asset {}: status {}",
                    path, response.status
                )));
            }
            entries.push(CacheEntry::from_response(request.cache_key(), &response));
        }

        let bucket_name = self.config.cache_name();
        let mut caches = self.caches.write().await;
        let bucket = caches.open(&bucket_name);
        let count = entries.len();
        for entry in entries {
            bucket.put(entry);
        }
        debug!(bucket = %bucket_name, count, "core assets cached");
        Ok(())
    }

    // ==================== Activate ====================

    /// Activation handler: garbage-collect stale buckets, enable
    /// navigation preload where supported, claim open pages, and
    /// notify them.
    pub async fn activate(&self) -> Result<()> {
        self.lifecycle.write().await.begin_activate()?;
        let current = self.config.cache_name();

        {
            let mut caches = self.caches.write().await;
            for name in caches.keys() {
                if name != current {
                    caches.delete(&name);
                    debug!(bucket = %name, "deleted stale cache bucket");
                }
            }
        }

        if self.fetcher.supports_navigation_preload() {
            self.preload_enabled.store(true, Ordering::Relaxed);
            debug!("navigation preload enabled");
        } else {
            debug!("navigation preload unsupported, skipping");
        }

        let delivered = {
            let mut clients = self.clients.write().await;
            let claimed = clients.claim();
            trace!(claimed, "claimed open pages");
            clients.broadcast(&ClientMessage::Activated {
                version: self.config.version.clone(),
            })
        };
        debug!(version = %self.config.version, delivered, "activation complete");

        self.lifecycle.write().await.activation_complete()?;
        Ok(())
    }

    // ==================== Messages ====================

    /// Handle a message from a page.
    pub async fn handle_message(&self, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::SkipWaiting => {
                let activate_now = { self.lifecycle.write().await.request_skip_waiting() };
                if activate_now {
                    self.activate().await?;
                } else {
                    debug!("skip-waiting latched or ignored");
                }
                Ok(())
            }
            other => {
                warn!(?other, "unexpected message from page");
                Ok(())
            }
        }
    }

    /// Handle a raw JSON message from a page.
    pub async fn handle_message_json(&self, raw: &str) -> Result<()> {
        let message: ClientMessage =
            serde_json::from_str(raw).map_err(|err| SwError::Message(err.to_string()))?;
        self.handle_message(message).await
    }

    // ==================== Fetch routing ====================

    /// Fetch handler: pick exactly one strategy for the request.
    /// `None` means the request is not intercepted and the platform's
    /// default handling applies.
    pub async fn handle_fetch(&self, event: FetchEvent) -> Option<FetchResponse> {
        let class = classify(&event.request, &self.config);
        trace!(url = %event.request.url, ?class, "routing request");

        match class {
            RequestClass::Passthrough => None,
            RequestClass::WorkerScript => self.worker_script(&event.request).await,
            RequestClass::Navigation => Some(self.navigate(event).await),
            RequestClass::Api => self.network_first(&event.request).await,
            RequestClass::CoreAsset => self.cache_first(&event.request).await,
            RequestClass::DynamicAsset => self.stale_while_revalidate(&event.request).await,
            RequestClass::SameOriginGet => self.network_with_offline_fallback(&event.request).await,
        }
    }

    /// The worker's own script always comes from the network so an
    /// update is never masked by a cached copy.
    async fn worker_script(&self, request: &FetchRequest) -> Option<FetchResponse> {
        match self.fetcher.fetch(request).await {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(url = %request.url, error = %err, "worker script fetch failed");
                None
            }
        }
    }

    /// Network-first: prefer a live response, write it back off the
    /// hot path, fall back to cache when the network is down.
    async fn network_first(&self, request: &FetchRequest) -> Option<FetchResponse> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.spawn_store(request.cache_key(), response.clone());
                }
                Some(response)
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "network failed, trying cache");
                self.match_current(&request.cache_key()).await
            }
        }
    }

    /// Cache-first: core assets only change with a version bump, so a
    /// network miss is not written back.
    async fn cache_first(&self, request: &FetchRequest) -> Option<FetchResponse> {
        if let Some(hit) = self.match_current(&request.cache_key()).await {
            return Some(hit);
        }
        match self.fetcher.fetch(request).await {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(url = %request.url, error = %err, "core asset unavailable");
                None
            }
        }
    }

    /// Stale-while-revalidate: serve the cached copy immediately and
    /// refresh it in the background; on a miss the caller waits on the
    /// network.
    async fn stale_while_revalidate(&self, request: &FetchRequest) -> Option<FetchResponse> {
        let key = request.cache_key();
        if let Some(hit) = self.match_current(&key).await {
            self.spawn_revalidate(request.clone());
            return Some(hit);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(key, &response).await;
                }
                Some(response)
            }
            Err(err) => {
                warn!(url = %request.url, error = %err, "dynamic asset unavailable");
                None
            }
        }
    }

    /// Default strategy for uncatalogued same-origin GETs: network,
    /// with the cached offline page for document requests on failure.
    async fn network_with_offline_fallback(
        &self,
        request: &FetchRequest,
    ) -> Option<FetchResponse> {
        match self.fetcher.fetch(request).await {
            Ok(response) => Some(response),
            Err(err) if request.accepts_html() => {
                debug!(url = %request.url, error = %err, "serving offline page");
                self.match_current(&self.config.offline_page).await
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "no fallback for sub-resource");
                None
            }
        }
    }

    // ==================== Navigation ====================

    /// Navigation chain: preload → cache → network → offline page →
    /// root document → synthesized offline HTML. Each step is guarded
    /// independently; this never fails to produce a response.
    async fn navigate(&self, event: FetchEvent) -> FetchResponse {
        let request = event.request;

        if self.preload_enabled.load(Ordering::Relaxed) {
            if let Some(mut preload) = event.preload {
                trace!(url = %request.url, "navigation served from preload");
                preload.source = ResponseSource::Preload;
                return preload;
            }
        }

        let key = request.cache_key();
        if let Some(hit) = self.match_current(&key).await {
            return hit;
        }

        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                // Only a plain 200 is worth revisiting offline.
                if response.status == StatusCode::OK {
                    self.spawn_store(key, response.clone());
                }
                response
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "navigation offline, falling back");
                if let Some(offline) = self.match_current(&self.config.offline_page).await {
                    return offline;
                }
                if let Some(root) = self.match_current(&self.config.root_document).await {
                    return root;
                }
                FetchResponse::synthesized_offline()
            }
        }
    }

    // ==================== Background sync ====================

    /// Sync handler: refresh every dynamic asset with a cache-bypassing
    /// read. Per-asset failures are logged and the rest proceed.
    pub async fn sync(&self, tag: &str) {
        if tag != self.config.sync_tag {
            debug!(%tag, "ignoring unknown sync tag");
            return;
        }

        for path in &self.config.dynamic_assets {
            let request = match self.asset_request(path) {
                Ok(request) => request,
                Err(err) => {
                    warn!(%path, error = %err, "skipping unfetchable asset");
                    continue;
                }
            };
            match self.fetcher.fetch_fresh(&request).await {
                Ok(response) if response.is_success() => {
                    self.store(request.cache_key(), &response).await;
                    trace!(%path, "dynamic asset refreshed");
                }
                Ok(response) => {
                    warn!(%path, status = %response.status, "sync refresh rejected");
                }
                Err(err) => {
                    warn!(%path, error = %err, "sync refresh failed");
                }
            }
        }
    }

    // ==================== Helpers ====================

    fn asset_request(&self, path: &str) -> Result<FetchRequest> {
        let url = self
            .config
            .origin
            .join(path)
            .map_err(|err| SwError::Config(format!("asset path {}: {}", path, err)))?;
        Ok(FetchRequest::get(url))
    }

    async fn fetch_and_store(&self, path: &str) -> Result<()> {
        let request = self.asset_request(path)?;
        let response = self.fetcher.fetch(&request).await?;
        if !response.is_success() {
            return Err(SwError::Cache(format!(
                "unexpected status {} for {}",
                response.status, path
            )));
        }
        self.store(request.cache_key(), &response).await;
        Ok(())
    }

    async fn match_current(&self, key: &str) -> Option<FetchResponse> {
        self.caches
            .read()
            .await
            .get(&self.config.cache_name())
            .and_then(|bucket| bucket.match_key(key))
            .map(CacheEntry::to_response)
    }

    async fn store(&self, key: String, response: &FetchResponse) {
        let mut caches = self.caches.write().await;
        caches
            .open(&self.config.cache_name())
            .put(CacheEntry::from_response(key, response));
    }

    /// Write a response copy back without delaying the caller.
    fn spawn_store(&self, key: String, response: FetchResponse) {
        let caches = Arc::clone(&self.caches);
        let bucket = self.config.cache_name();
        tokio::spawn(async move {
            caches
                .write()
                .await
                .open(&bucket)
                .put(CacheEntry::from_response(key.clone(), &response));
            trace!(%key, "response cached");
        });
    }

    /// Background refresh for a dynamic asset already served stale.
    fn spawn_revalidate(&self, request: FetchRequest) {
        let fetcher = Arc::clone(&self.fetcher);
        let caches = Arc::clone(&self.caches);
        let bucket = self.config.cache_name();
        tokio::spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    let key = request.cache_key();
                    caches
                        .write()
                        .await
                        .open(&bucket)
                        .put(CacheEntry::from_response(key.clone(), &response));
                    trace!(%key, "dynamic asset revalidated");
                }
                Ok(response) => {
                    debug!(url = %request.url, status = %response.status, "revalidation rejected");
                }
                Err(err) => {
                    debug!(url = %request.url, error = %err, "revalidation failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use hashbrown::HashMap;
    use std::sync::Mutex;

    /// In-memory network edge with an offline switch and a call log.
    struct TestFetcher {
        routes: Mutex<HashMap<String, FetchResponse>>,
        online: AtomicBool,
        calls: Mutex<Vec<String>>,
        preload: bool,
    }

    impl TestFetcher {
        fn new(routes: &[(&str, &str)]) -> Self {
            let map = routes
                .iter()
                .map(|(path, body)| (path.to_string(), FetchResponse::ok(body.to_string())))
                .collect();
            Self {
                routes: Mutex::new(map),
                online: AtomicBool::new(true),
                calls: Mutex::new(Vec::new()),
                preload: false,
            }
        }

        fn with_preload_support(mut self) -> Self {
            self.preload = true;
            self
        }

        fn set_online(&self, online: bool) {
            self.online.store(online, Ordering::Relaxed);
        }

        fn set_route(&self, path: &str, body: &str) {
            self.routes
                .lock()
                .unwrap()
                .insert(path.to_string(), FetchResponse::ok(body.to_string()));
        }

        fn remove_route(&self, path: &str) {
            self.routes.lock().unwrap().remove(path);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    impl Fetcher for TestFetcher {
        fn fetch(
            &self,
            request: &FetchRequest,
        ) -> impl std::future::Future<Output = std::result::Result<FetchResponse, FetchError>> + Send
        {
            let key = request.cache_key();
            self.calls.lock().unwrap().push(key.clone());
            let result = if !self.online.load(Ordering::Relaxed) {
                Err(FetchError::Unreachable("offline".into()))
            } else {
                match self.routes.lock().unwrap().get(&key) {
                    Some(response) => Ok(response.clone()),
                    None => Ok(FetchResponse::with_status(StatusCode::NOT_FOUND, "")),
                }
            };
            std::future::ready(result)
        }

        fn supports_navigation_preload(&self) -> bool {
            self.preload
        }
    }

    const SITE: &[(&str, &str)] = &[
        ("/", "<home>"),
        ("/index.html", "<index>"),
        ("/styles.css", "body{margin:0}"),
        ("/offline.html", "<offline page>"),
        ("/data/news.json", r#"{"rev":1}"#),
        ("/img/hero.webp", "RIFFWEBP"),
        ("/about.html", "<about>"),
        ("/api/news", r#"{"items":[]}"#),
        ("/sw.js", "// worker"),
    ];

    fn test_config() -> WorkerConfig {
        let mut config = WorkerConfig::new(
            "brochure",
            "2.1.0",
            Url::parse("https://example.com").unwrap(),
        );
        config.core_assets = vec![
            "/".into(),
            "/index.html".into(),
            "/styles.css".into(),
            "/offline.html".into(),
        ];
        config.dynamic_assets = vec!["/data/news.json".into()];
        config.optional_assets = vec!["/img/hero.webp".into()];
        config
    }

    fn worker() -> ServiceWorker<TestFetcher> {
        ServiceWorker::new(test_config(), TestFetcher::new(SITE)).unwrap()
    }

    async fn installed_worker() -> ServiceWorker<TestFetcher> {
        let worker = worker();
        worker.install().await.unwrap();
        worker
    }

    async fn active_worker() -> ServiceWorker<TestFetcher> {
        let worker = installed_worker().await;
        worker.activate().await.unwrap();
        worker
    }

    /// Let spawned write-back tasks run on the test runtime.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn get(path: &str) -> FetchEvent {
        FetchEvent::new(FetchRequest::get(
            Url::parse(&format!("https://example.com{}", path)).unwrap(),
        ))
    }

    fn navigate(path: &str) -> FetchEvent {
        FetchEvent::new(FetchRequest::navigation(
            Url::parse(&format!("https://example.com{}", path)).unwrap(),
        ))
    }

    async fn delete_cached(worker: &ServiceWorker<TestFetcher>, key: &str) {
        worker
            .caches
            .write()
            .await
            .open(&worker.config.cache_name())
            .delete(key);
    }

    // ==================== Install ====================

    #[tokio::test]
    async fn test_install_populates_bucket() {
        let worker = installed_worker().await;
        assert_eq!(worker.state().await, WorkerState::Installed);

        for key in ["/", "/index.html", "/styles.css", "/data/news.json", "/img/hero.webp"] {
            assert!(worker.cached(key).await.is_some(), "missing {}", key);
        }
        assert_eq!(worker.bucket_names().await, vec!["brochure-v2.1.0".to_string()]);
    }

    #[tokio::test]
    async fn test_install_core_failure_is_fatal() {
        let worker = worker();
        worker.fetcher().set_online(false);

        let err = worker.install().await.unwrap_err();
        assert_eq!(err.category(), "install");
        assert_eq!(worker.state().await, WorkerState::Redundant);
        // No partially filled bucket left behind.
        assert!(worker.bucket_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_install_core_bad_status_is_fatal() {
        let worker = worker();
        worker.fetcher().remove_route("/styles.css");

        assert!(worker.install().await.is_err());
        assert_eq!(worker.state().await, WorkerState::Redundant);
    }

    #[tokio::test]
    async fn test_install_tolerates_dynamic_and_optional_failure() {
        let worker = worker();
        worker.fetcher().remove_route("/data/news.json");
        worker.fetcher().remove_route("/img/hero.webp");

        worker.install().await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Installed);
        assert!(worker.cached("/data/news.json").await.is_none());
        assert!(worker.cached("/").await.is_some());
    }

    // ==================== Cache-first ====================

    #[tokio::test]
    async fn test_core_asset_cache_hit_skips_network() {
        let worker = active_worker().await;
        worker.fetcher().clear_calls();

        let response = worker.handle_fetch(get("/styles.css")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.text().unwrap(), "body{margin:0}");
        assert!(worker.fetcher().calls().is_empty());
    }

    #[tokio::test]
    async fn test_core_asset_miss_fetches_without_writeback() {
        let worker = active_worker().await;
        delete_cached(&worker, "/styles.css").await;
        worker.fetcher().clear_calls();

        let response = worker.handle_fetch(get("/styles.css")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(worker.fetcher().calls(), vec!["/styles.css".to_string()]);

        settle().await;
        assert!(worker.cached("/styles.css").await.is_none());
    }

    // ==================== Stale-while-revalidate ====================

    #[tokio::test]
    async fn test_swr_serves_stale_then_updates() {
        let worker = active_worker().await;
        worker.fetcher().set_route("/data/news.json", r#"{"rev":2}"#);

        let first = worker.handle_fetch(get("/data/news.json")).await.unwrap();
        assert_eq!(first.source, ResponseSource::Cache);
        assert_eq!(first.text().unwrap(), r#"{"rev":1}"#);

        settle().await;
        let refreshed = worker.cached("/data/news.json").await.unwrap();
        assert_eq!(refreshed.text().unwrap(), r#"{"rev":2}"#);

        let second = worker.handle_fetch(get("/data/news.json")).await.unwrap();
        assert_eq!(second.text().unwrap(), r#"{"rev":2}"#);
    }

    #[tokio::test]
    async fn test_swr_miss_waits_for_network_and_stores() {
        let worker = active_worker().await;
        delete_cached(&worker, "/data/news.json").await;

        let response = worker.handle_fetch(get("/data/news.json")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert!(worker.cached("/data/news.json").await.is_some());
    }

    #[tokio::test]
    async fn test_swr_yields_nothing_when_cache_and_network_fail() {
        let worker = active_worker().await;
        delete_cached(&worker, "/data/news.json").await;
        worker.fetcher().set_online(false);

        assert!(worker.handle_fetch(get("/data/news.json")).await.is_none());
    }

    // ==================== Network-first (API) ====================

    #[tokio::test]
    async fn test_api_network_first_with_async_writeback() {
        let worker = active_worker().await;

        let response = worker.handle_fetch(get("/api/news")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);

        settle().await;
        assert!(worker.cached("/api/news").await.is_some());
    }

    #[tokio::test]
    async fn test_api_falls_back_to_cache_when_offline() {
        let worker = active_worker().await;
        worker.handle_fetch(get("/api/news")).await.unwrap();
        settle().await;

        worker.fetcher().set_online(false);
        let response = worker.handle_fetch(get("/api/news")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.text().unwrap(), r#"{"items":[]}"#);
    }

    #[tokio::test]
    async fn test_api_without_cache_or_network_fails() {
        let worker = active_worker().await;
        worker.fetcher().set_online(false);

        assert!(worker.handle_fetch(get("/api/fresh")).await.is_none());
    }

    // ==================== Activation ====================

    #[tokio::test]
    async fn test_activation_deletes_stale_buckets() {
        let worker = installed_worker().await;
        worker
            .caches
            .write()
            .await
            .open("brochure-v2.0.0")
            .put(CacheEntry::from_response("/", &FetchResponse::ok("<old>")));

        worker.activate().await.unwrap();

        assert_eq!(worker.state().await, WorkerState::Activated);
        assert_eq!(worker.bucket_names().await, vec!["brochure-v2.1.0".to_string()]);
    }

    #[tokio::test]
    async fn test_activation_claims_and_notifies_clients() {
        let worker = installed_worker().await;
        let (_id, mut rx) = worker
            .connect_client(Url::parse("https://example.com/").unwrap())
            .await;

        worker.activate().await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(ClientMessage::Activated {
                version: "2.1.0".into()
            })
        );
    }

    // ==================== Navigation ====================

    #[tokio::test]
    async fn test_navigation_200_is_cached_for_offline_revisit() {
        let worker = active_worker().await;

        let online = worker.handle_fetch(navigate("/about.html")).await.unwrap();
        assert_eq!(online.source, ResponseSource::Network);
        assert_eq!(online.text().unwrap(), "<about>");
        settle().await;

        worker.fetcher().set_online(false);
        let offline = worker.handle_fetch(navigate("/about.html")).await.unwrap();
        assert_eq!(offline.source, ResponseSource::Cache);
        assert_eq!(offline.text().unwrap(), "<about>");
    }

    #[tokio::test]
    async fn test_navigation_non_200_is_not_cached() {
        let worker = active_worker().await;

        let response = worker.handle_fetch(navigate("/missing.html")).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        settle().await;
        assert!(worker.cached("/missing.html").await.is_none());
    }

    #[tokio::test]
    async fn test_navigation_fallback_order() {
        let worker = active_worker().await;
        worker.fetcher().set_online(false);

        let offline = worker.handle_fetch(navigate("/uncached")).await.unwrap();
        assert_eq!(offline.text().unwrap(), "<offline page>");

        delete_cached(&worker, "/offline.html").await;
        let root = worker.handle_fetch(navigate("/uncached")).await.unwrap();
        assert_eq!(root.text().unwrap(), "<home>");

        delete_cached(&worker, "/").await;
        let synthesized = worker.handle_fetch(navigate("/uncached")).await.unwrap();
        assert_eq!(synthesized.status, StatusCode::OK);
        assert_eq!(synthesized.source, ResponseSource::Synthesized);
    }

    #[tokio::test]
    async fn test_navigation_total_miss_synthesizes_offline_page() {
        // Never installed: empty cache, no offline page, no root.
        let worker = worker();
        worker.fetcher().set_online(false);

        let response = worker.handle_fetch(navigate("/anything")).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.source, ResponseSource::Synthesized);
        assert!(response
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_navigation_preload_when_enabled() {
        let config = test_config();
        let fetcher = TestFetcher::new(SITE).with_preload_support();
        let worker = ServiceWorker::new(config, fetcher).unwrap();
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        worker.fetcher().clear_calls();

        let event = navigate("/fresh.html").with_preload(FetchResponse::ok("<preloaded>"));
        let response = worker.handle_fetch(event).await.unwrap();

        assert_eq!(response.source, ResponseSource::Preload);
        assert_eq!(response.text().unwrap(), "<preloaded>");
        assert!(worker.fetcher().calls().is_empty());
    }

    #[tokio::test]
    async fn test_navigation_preload_ignored_when_unsupported() {
        let worker = active_worker().await;

        let event = navigate("/about.html").with_preload(FetchResponse::ok("<preloaded>"));
        let response = worker.handle_fetch(event).await.unwrap();

        // Falls through to the network, not the preload body.
        assert_eq!(response.text().unwrap(), "<about>");
    }

    // ==================== Skip-waiting ====================

    #[tokio::test]
    async fn test_skip_waiting_activates_waiting_worker() {
        let worker = installed_worker().await;
        assert_eq!(worker.state().await, WorkerState::Installed);

        worker
            .handle_message_json(r#"{"type":"SKIP_WAITING"}"#)
            .await
            .unwrap();

        assert_eq!(worker.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_skip_waiting_before_install_applies_after() {
        let worker = worker();
        worker.handle_message(ClientMessage::SkipWaiting).await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Parsed);

        worker.install().await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_malformed_message_is_an_error() {
        let worker = installed_worker().await;
        let err = worker.handle_message_json("{not json").await.unwrap_err();
        assert_eq!(err.category(), "message");
        assert_eq!(worker.state().await, WorkerState::Installed);
    }

    // ==================== Background sync ====================

    #[tokio::test]
    async fn test_sync_refreshes_dynamic_assets() {
        let worker = active_worker().await;
        worker.fetcher().set_route("/data/news.json", r#"{"rev":9}"#);

        worker.sync("update-content").await;

        let refreshed = worker.cached("/data/news.json").await.unwrap();
        assert_eq!(refreshed.text().unwrap(), r#"{"rev":9}"#);
    }

    #[tokio::test]
    async fn test_sync_ignores_unknown_tag() {
        let worker = active_worker().await;
        worker.fetcher().set_route("/data/news.json", r#"{"rev":9}"#);

        worker.sync("unrelated-tag").await;

        let cached = worker.cached("/data/news.json").await.unwrap();
        assert_eq!(cached.text().unwrap(), r#"{"rev":1}"#);
    }

    #[tokio::test]
    async fn test_sync_failure_does_not_abort_remaining_assets() {
        let mut config = test_config();
        config.dynamic_assets = vec!["/data/gone.json".into(), "/data/news.json".into()];
        let worker = ServiceWorker::new(config, TestFetcher::new(SITE)).unwrap();
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        worker.fetcher().set_route("/data/news.json", r#"{"rev":3}"#);
        worker.sync("update-content").await;

        assert!(worker.cached("/data/gone.json").await.is_none());
        let refreshed = worker.cached("/data/news.json").await.unwrap();
        assert_eq!(refreshed.text().unwrap(), r#"{"rev":3}"#);
    }

    // ==================== Default strategy and passthrough ====================

    #[tokio::test]
    async fn test_other_get_offline_html_fallback() {
        let worker = active_worker().await;
        worker.fetcher().set_online(false);

        let mut document = get("/brochure.pdf");
        document.request.headers.insert(
            http::header::ACCEPT,
            http::HeaderValue::from_static("text/html,*/*"),
        );
        let response = worker.handle_fetch(document).await.unwrap();
        assert_eq!(response.text().unwrap(), "<offline page>");

        // Sub-resources get no fallback.
        assert!(worker.handle_fetch(get("/app.js")).await.is_none());
    }

    #[tokio::test]
    async fn test_worker_script_always_network() {
        let worker = active_worker().await;
        worker.fetcher().clear_calls();

        let response = worker.handle_fetch(get("/sw.js")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(worker.fetcher().calls(), vec!["/sw.js".to_string()]);

        settle().await;
        assert!(worker.cached("/sw.js").await.is_none());

        worker.fetcher().set_online(false);
        assert!(worker.handle_fetch(get("/sw.js")).await.is_none());
    }

    #[tokio::test]
    async fn test_non_get_and_cross_origin_pass_through() {
        let worker = active_worker().await;

        let mut post = get("/api/contact");
        post.request.method = http::Method::POST;
        assert!(worker.handle_fetch(post).await.is_none());

        let cross = FetchEvent::new(FetchRequest::get(
            Url::parse("https://cdn.example.net/lib.js").unwrap(),
        ));
        assert!(worker.handle_fetch(cross).await.is_none());
    }

    #[tokio::test]
    async fn test_overlapping_manifest_rejected() {
        let mut config = test_config();
        config.dynamic_assets.push("/styles.css".into());
        assert!(ServiceWorker::new(config, TestFetcher::new(SITE)).is_err());
    }
}
