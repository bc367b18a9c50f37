//! # OffKit Service Worker
//!
//! Offline cache engine for a static site.
//!
//! ## Features
//!
//! - **Versioned cache buckets**: one bucket per worker version, stale
//!   buckets garbage-collected on activation
//! - **Install**: core assets cached atomically, dynamic and optional
//!   assets best-effort
//! - **Fetch routing**: network-first, cache-first,
//!   stale-while-revalidate, and offline-fallback strategies
//! - **Navigation**: preload → cache → network → offline page chain
//! - **Clients API**: claim and broadcast to controlled pages
//! - **Background sync**: dynamic assets refreshed on demand
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker<F: Fetcher>
//!     │
//!     ├── WorkerConfig (immutable: version, asset manifest)
//!     ├── WorkerLifecycle (installing → waiting → activating → activated)
//!     ├── CacheStorage
//!     │       └── CacheBucket "<app>-v<version>"
//!     │               └── key → CacheEntry
//!     └── Clients
//!             └── ClientMessage broadcast
//! ```

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod config;
pub mod fetch;
pub mod lifecycle;
pub mod worker;

pub use cache::{CacheBucket, CacheEntry, CacheStorage};
pub use clients::{ClientMessage, Clients};
pub use config::{AssetClass, WorkerConfig};
pub use fetch::{FetchError, FetchRequest, FetchResponse, Fetcher, RequestClass, ResponseSource};
pub use lifecycle::{WorkerLifecycle, WorkerState};
pub use worker::{FetchEvent, ServiceWorker};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Install failed: {0}")]
    Install(String),

    #[error("Invalid state transition from {from}: {reason}")]
    State { from: WorkerState, reason: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Message error: {0}")]
    Message(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl SwError {
    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            SwError::Config(_) => "config",
            SwError::Install(_) => "install",
            SwError::State { .. } => "state",
            SwError::Cache(_) => "cache",
            SwError::Message(_) => "message",
            SwError::Fetch(_) => "fetch",
        }
    }
}

/// Result type alias for service worker operations.
pub type Result<T> = std::result::Result<T, SwError>;
