//! Versioned cache buckets.
//!
//! A bucket holds key → response entries for one worker version.
//! Exactly one bucket is current at a time; activation deletes the
//! rest. Entries are overwritten last-write-wins and carry no expiry:
//! a stale entry lives until the next successful refresh.

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, StatusCode};

use crate::fetch::{FetchResponse, ResponseSource};

/// A cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cache key (request path plus query).
    pub key: String,

    /// Response status.
    pub status: StatusCode,

    /// Response headers.
    pub headers: HeaderMap,

    /// Response body.
    pub body: Bytes,

    /// Stored-at timestamp (ms since epoch). Informational only; no
    /// eviction is built on it.
    pub stored_at: u64,
}

impl CacheEntry {
    /// Snapshot a response into an entry.
    pub fn from_response(key: impl Into<String>, response: &FetchResponse) -> Self {
        Self {
            key: key.into(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: now_millis(),
        }
    }

    /// Rehydrate the entry as a cache-sourced response.
    pub fn to_response(&self) -> FetchResponse {
        FetchResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            source: ResponseSource::Cache,
        }
    }
}

/// A named cache bucket.
#[derive(Debug, Default)]
pub struct CacheBucket {
    /// Bucket name, `<app-name>-v<version>`.
    pub name: String,

    entries: HashMap<String, CacheEntry>,
}

impl CacheBucket {
    /// Create an empty bucket.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a key against the bucket.
    pub fn match_key(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry, replacing any previous one for the same key.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Delete an entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bucket holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All cache buckets known to the worker.
#[derive(Debug, Default)]
pub struct CacheStorage {
    buckets: HashMap<String, CacheBucket>,
}

impl CacheStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a bucket, creating it if needed.
    pub fn open(&mut self, name: &str) -> &mut CacheBucket {
        self.buckets
            .entry(name.to_string())
            .or_insert_with(|| CacheBucket::new(name))
    }

    /// Get a bucket without creating it.
    pub fn get(&self, name: &str) -> Option<&CacheBucket> {
        self.buckets.get(name)
    }

    /// Check if a bucket exists.
    pub fn has(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    /// Delete a bucket.
    pub fn delete(&mut self, name: &str) -> bool {
        self.buckets.remove(name).is_some()
    }

    /// All bucket names.
    pub fn keys(&self) -> Vec<String> {
        self.buckets.keys().cloned().collect()
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
