//! Fetch types, the network seam, and request classification.

use std::future::Future;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::config::{AssetClass, WorkerConfig};

/// Body of the synthesized offline response, used when every other
/// fallback for a navigation has failed.
pub const OFFLINE_HTML: &str = "<!DOCTYPE html>\
<html lang=\"en\"><head><meta charset=\"utf-8\"><title>Offline</title></head>\
<body><h1>You are offline</h1>\
<p>This page is not available without a network connection.</p></body></html>";

/// Network-level fetch errors.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request URL.
    pub url: Url,

    /// Request method.
    pub method: Method,

    /// Request headers.
    pub headers: HeaderMap,

    /// Whether this is a navigation-mode request.
    pub is_navigation: bool,
}

impl FetchRequest {
    /// Create a plain GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            is_navigation: false,
        }
    }

    /// Create a navigation request (Accept: text/html).
    pub fn navigation(url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        Self {
            url,
            method: Method::GET,
            headers,
            is_navigation: true,
        }
    }

    /// Cache key: path plus query, host-independent within the origin.
    pub fn cache_key(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// Whether the Accept header indicates an HTML document.
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false)
    }
}

/// Where a response came from, for logs and callers that care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fetched from the network.
    Network,
    /// Served from a cache bucket.
    Cache,
    /// Navigation preload response supplied with the event.
    Preload,
    /// Synthesized by the worker (offline page of last resort).
    Synthesized,
}

/// A response returned to the page.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Status code.
    pub status: StatusCode,

    /// Response headers.
    pub headers: HeaderMap,

    /// Response body.
    pub body: Bytes,

    /// Which path produced this response.
    pub source: ResponseSource,
}

impl FetchResponse {
    /// Create a 200 network response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    /// Create a network response with an explicit status.
    pub fn with_status(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    /// Set the Content-Type header.
    pub fn content_type(mut self, value: &'static str) -> Self {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
        self
    }

    /// The static offline page, synthesized so navigation never
    /// hard-fails with a browser error page.
    pub fn synthesized_offline() -> Self {
        let mut response = Self::ok(OFFLINE_HTML).content_type("text/html; charset=utf-8");
        response.source = ResponseSource::Synthesized;
        response
    }

    /// Check if the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get body as text.
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }
}

/// Network access seam.
///
/// The worker never talks to a socket directly; the host supplies a
/// fetcher and the engine decides when to call it.
pub trait Fetcher: Send + Sync + 'static {
    /// Fetch a request from the network.
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;

    /// Cache-bypassing fetch, used by background sync. Defaults to a
    /// plain fetch for hosts without an HTTP cache layer.
    fn fetch_fresh(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send {
        self.fetch(request)
    }

    /// Whether the platform can start navigation fetches before the
    /// worker boots.
    fn supports_navigation_preload(&self) -> bool {
        false
    }
}

// ==================== Classification ====================

/// Strategy selector for an intercepted request, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// The worker's own script: always network, never cached.
    WorkerScript,
    /// Navigation-mode request.
    Navigation,
    /// `/api/`-prefixed request: network-first.
    Api,
    /// Core asset: cache-first.
    CoreAsset,
    /// Dynamic asset: stale-while-revalidate.
    DynamicAsset,
    /// Any other same-origin GET: network with HTML offline fallback.
    SameOriginGet,
    /// Not intercepted (non-GET or cross-origin).
    Passthrough,
}

/// Classify a request against the worker configuration.
///
/// Re-derived per request; nothing about a request is persisted.
pub fn classify(request: &FetchRequest, config: &WorkerConfig) -> RequestClass {
    if request.method != Method::GET || !config.is_same_origin(&request.url) {
        return RequestClass::Passthrough;
    }

    let path = request.url.path();
    if path == config.script_path {
        RequestClass::WorkerScript
    } else if request.is_navigation {
        RequestClass::Navigation
    } else if path.starts_with(&config.api_prefix) {
        RequestClass::Api
    } else {
        match config.classify_asset(path) {
            Some(AssetClass::Core) => RequestClass::CoreAsset,
            Some(AssetClass::Dynamic) => RequestClass::DynamicAsset,
            // Optional assets are cached at install but served by the
            // default strategy.
            Some(AssetClass::Optional) | None => RequestClass::SameOriginGet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        let mut config = WorkerConfig::new(
            "brochure",
            "1.0.0",
            Url::parse("https://example.com").unwrap(),
        );
        config.core_assets = vec!["/".into(), "/styles.css".into()];
        config.dynamic_assets = vec!["/data/news.json".into()];
        config.optional_assets = vec!["/img/hero.webp".into()];
        config
    }

    fn get(path: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(&format!("https://example.com{}", path)).unwrap())
    }

    #[test]
    fn test_classify_precedence() {
        let config = config();

        assert_eq!(classify(&get("/sw.js"), &config), RequestClass::WorkerScript);
        assert_eq!(
            classify(&get("/api/contact"), &config),
            RequestClass::Api
        );
        assert_eq!(classify(&get("/styles.css"), &config), RequestClass::CoreAsset);
        assert_eq!(
            classify(&get("/data/news.json"), &config),
            RequestClass::DynamicAsset
        );
        assert_eq!(
            classify(&get("/img/hero.webp"), &config),
            RequestClass::SameOriginGet
        );
        assert_eq!(classify(&get("/anything"), &config), RequestClass::SameOriginGet);
    }

    #[test]
    fn test_navigation_beats_asset_lists() {
        let config = config();
        let request =
            FetchRequest::navigation(Url::parse("https://example.com/styles.css").unwrap());
        assert_eq!(classify(&request, &config), RequestClass::Navigation);
    }

    #[test]
    fn test_worker_script_beats_navigation() {
        let config = config();
        let request = FetchRequest::navigation(Url::parse("https://example.com/sw.js").unwrap());
        assert_eq!(classify(&request, &config), RequestClass::WorkerScript);
    }

    #[test]
    fn test_passthrough() {
        let config = config();

        let mut post = get("/api/contact");
        post.method = Method::POST;
        assert_eq!(classify(&post, &config), RequestClass::Passthrough);

        let cross =
            FetchRequest::get(Url::parse("https://cdn.example.net/lib.js").unwrap());
        assert_eq!(classify(&cross, &config), RequestClass::Passthrough);
    }

    #[test]
    fn test_cache_key_includes_query() {
        let request =
            FetchRequest::get(Url::parse("https://example.com/api/news?page=2").unwrap());
        assert_eq!(request.cache_key(), "/api/news?page=2");

        let plain = FetchRequest::get(Url::parse("https://example.com/styles.css").unwrap());
        assert_eq!(plain.cache_key(), "/styles.css");
    }

    #[test]
    fn test_accepts_html() {
        let nav = FetchRequest::navigation(Url::parse("https://example.com/about").unwrap());
        assert!(nav.accepts_html());

        let plain = FetchRequest::get(Url::parse("https://example.com/app.js").unwrap());
        assert!(!plain.accepts_html());
    }

    #[test]
    fn test_synthesized_offline() {
        let response = FetchResponse::synthesized_offline();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.source, ResponseSource::Synthesized);
        assert!(response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .starts_with("text/html"));
        assert!(response.text().unwrap().contains("offline"));
    }
}
