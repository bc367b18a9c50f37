//! Worker configuration: version, origin, and the asset manifest.
//!
//! The configuration is an immutable value injected when the worker is
//! created. The asset manifest splits cacheable paths into three
//! disjoint classes:
//!
//! - **core**: required for the page to render; install fails without
//!   them
//! - **dynamic**: best-effort, refreshed via stale-while-revalidate
//!   and background sync
//! - **optional**: best-effort, failures silently ignored

use url::Url;

use crate::SwError;

/// Classification of a manifest asset path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    /// Must be cached at install; install-fatal on failure.
    Core,
    /// Cached opportunistically, refreshed by sync.
    Dynamic,
    /// Cached opportunistically, failures ignored.
    Optional,
}

/// Immutable worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Application name, used as the cache bucket name prefix.
    pub app_name: String,

    /// Version string baked in at build time (manually incremented).
    pub version: String,

    /// Origin the worker controls; cross-origin requests pass through.
    pub origin: Url,

    /// Core asset paths.
    pub core_assets: Vec<String>,

    /// Dynamic asset paths.
    pub dynamic_assets: Vec<String>,

    /// Optional asset paths.
    pub optional_assets: Vec<String>,

    /// Path of the worker's own script; never served from cache.
    pub script_path: String,

    /// Offline fallback page path.
    pub offline_page: String,

    /// Root document path, the last cache fallback for navigations.
    pub root_document: String,

    /// Prefix for network-first API requests.
    pub api_prefix: String,

    /// Background sync tag that triggers a dynamic-asset refresh.
    pub sync_tag: String,
}

impl WorkerConfig {
    /// Create a configuration with the standard path conventions.
    pub fn new(app_name: impl Into<String>, version: impl Into<String>, origin: Url) -> Self {
        Self {
            app_name: app_name.into(),
            version: version.into(),
            origin,
            core_assets: Vec::new(),
            dynamic_assets: Vec::new(),
            optional_assets: Vec::new(),
            script_path: "/sw.js".to_string(),
            offline_page: "/offline.html".to_string(),
            root_document: "/".to_string(),
            api_prefix: "/api/".to_string(),
            sync_tag: "update-content".to_string(),
        }
    }

    /// Name of the current cache bucket: `<app-name>-v<version>`.
    pub fn cache_name(&self) -> String {
        format!("{}-v{}", self.app_name, self.version)
    }

    /// Look up the manifest class of a path, if any.
    pub fn classify_asset(&self, path: &str) -> Option<AssetClass> {
        if self.core_assets.iter().any(|p| p == path) {
            Some(AssetClass::Core)
        } else if self.dynamic_assets.iter().any(|p| p == path) {
            Some(AssetClass::Dynamic)
        } else if self.optional_assets.iter().any(|p| p == path) {
            Some(AssetClass::Optional)
        } else {
            None
        }
    }

    /// Check whether a URL belongs to the controlled origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.origin.scheme()
            && url.host() == self.origin.host()
            && url.port_or_known_default() == self.origin.port_or_known_default()
    }

    /// Validate manifest invariants: the three asset classes must be
    /// disjoint sets.
    pub fn validate(&self) -> Result<(), SwError> {
        for path in &self.core_assets {
            if self.dynamic_assets.contains(path) || self.optional_assets.contains(path) {
                return Err(SwError::Config(format!(
                    "asset {} listed in more than one class",
                    path
                )));
            }
        }
        for path in &self.dynamic_assets {
            if self.optional_assets.contains(path) {
                return Err(SwError::Config(format!(
                    "asset {} listed in more than one class",
                    path
                )));
            }
        }
        Ok(())
    }
}
