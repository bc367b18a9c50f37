//! OffKit smoke harness.
//!
//! Drives the cache engine through a full lifecycle against a scripted
//! static site: install, activate, online fetches, then the offline
//! fallback chain and a background sync. Run with
//! `RUST_LOG=offkit_sw=debug` for the engine's view of each step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use offkit_common::{init_logging, LogConfig};
use offkit_sw::{
    FetchError, FetchEvent, FetchRequest, FetchResponse, Fetcher, ServiceWorker, SwError,
    WorkerConfig,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::info;
use url::Url;

/// Scripted network edge: a fixed route table and an offline switch.
struct StaticSiteFetcher {
    routes: Mutex<HashMap<String, String>>,
    online: AtomicBool,
}

impl StaticSiteFetcher {
    fn new(routes: &[(&str, &str)]) -> Self {
        Self {
            routes: Mutex::new(
                routes
                    .iter()
                    .map(|(path, body)| (path.to_string(), body.to_string()))
                    .collect(),
            ),
            online: AtomicBool::new(true),
        }
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    fn set_route(&self, path: &str, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), body.to_string());
    }
}

impl Fetcher for StaticSiteFetcher {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl std::future::Future<Output = Result<FetchResponse, FetchError>> + Send {
        let result = if !self.online.load(Ordering::Relaxed) {
            Err(FetchError::Unreachable("offline".into()))
        } else {
            match self.routes.lock().unwrap().get(&request.cache_key()) {
                Some(body) => Ok(FetchResponse::ok(body.clone())),
                None => Ok(FetchResponse::with_status(
                    http::StatusCode::NOT_FOUND,
                    "not found",
                )),
            }
        };
        std::future::ready(result)
    }
}

fn site() -> &'static [(&'static str, &'static str)] {
    &[
        ("/", "<html>home</html>"),
        ("/index.html", "<html>index</html>"),
        ("/styles.css", "body{margin:0}"),
        ("/offline.html", "<html>offline</html>"),
        ("/data/news.json", r#"{"rev":1}"#),
        ("/about.html", "<html>about</html>"),
        ("/api/news", r#"{"items":["launch"]}"#),
    ]
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), SwError> {
    init_logging(LogConfig::default());

    let origin = Url::parse("https://example.com").expect("static origin");
    let mut config = WorkerConfig::new("brochure", "2.1.0", origin.clone());
    config.core_assets = vec![
        "/".into(),
        "/index.html".into(),
        "/styles.css".into(),
        "/offline.html".into(),
    ];
    config.dynamic_assets = vec!["/data/news.json".into()];

    let worker = ServiceWorker::new(config, StaticSiteFetcher::new(site()))?;

    let (client_id, mut messages) = worker.connect_client(origin.clone()).await;
    info!(%client_id, "page connected");

    worker.install().await?;
    info!(state = %worker.state().await, buckets = ?worker.bucket_names().await, "installed");

    worker.activate().await?;
    if let Some(message) = messages.recv().await {
        info!(payload = %json!(message), "page received broadcast");
    }

    // Online: navigation lands on the network and is cached for later.
    let about = navigate(&origin, "/about.html");
    let response = worker.handle_fetch(about).await.expect("navigation response");
    info!(source = ?response.source, body = %response.text().unwrap_or_default(), "online navigation");

    // Dynamic asset: stale copy now, refreshed copy behind it.
    worker.fetcher().set_route("/data/news.json", r#"{"rev":2}"#);
    let news = worker
        .handle_fetch(FetchEvent::new(request(&origin, "/data/news.json")))
        .await
        .expect("dynamic response");
    info!(source = ?news.source, body = %news.text().unwrap_or_default(), "stale-while-revalidate");
    tokio::task::yield_now().await;

    // Offline: the whole fallback chain.
    worker.fetcher().set_online(false);
    for path in ["/about.html", "/never-seen.html"] {
        let response = worker
            .handle_fetch(navigate(&origin, path))
            .await
            .expect("offline navigation response");
        info!(%path, source = ?response.source, "offline navigation");
    }

    // Back online: background sync refreshes dynamic content.
    worker.fetcher().set_online(true);
    worker.fetcher().set_route("/data/news.json", r#"{"rev":3}"#);
    worker.sync("update-content").await;
    if let Some(refreshed) = worker.cached("/data/news.json").await {
        info!(body = %refreshed.text().unwrap_or_default(), "after sync");
    }

    Ok(())
}

fn request(origin: &Url, path: &str) -> FetchRequest {
    FetchRequest::get(origin.join(path).expect("static path"))
}

fn navigate(origin: &Url, path: &str) -> FetchEvent {
    FetchEvent::new(FetchRequest::navigation(
        origin.join(path).expect("static path"),
    ))
}
