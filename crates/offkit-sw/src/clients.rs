//! Controlled pages and the page ↔ worker message protocol.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::trace;
use url::Url;

/// Messages exchanged between pages and the worker.
///
/// Wire shape is a tagged JSON object: `{"type":"SKIP_WAITING"}` from
/// a page, `{"type":"SERVICE_WORKER_ACTIVATED","version":"..."}` back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Page asks a waiting worker to activate immediately.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,

    /// Worker finished activating under the given version.
    #[serde(rename = "SERVICE_WORKER_ACTIVATED")]
    Activated { version: String },
}

/// A connected page.
#[derive(Debug)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Page URL.
    pub url: Url,

    /// Whether this worker controls the page. Only controlled pages
    /// receive broadcasts.
    pub controlled: bool,

    sender: mpsc::UnboundedSender<ClientMessage>,
}

/// Registry of open pages.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. Returns its ID and the receiving end of its
    /// message channel. New pages start uncontrolled until the worker
    /// claims them.
    pub fn connect(&mut self, url: Url) -> (String, mpsc::UnboundedReceiver<ClientMessage>) {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed));

        let (sender, receiver) = mpsc::unbounded_channel();
        self.clients.insert(
            id.clone(),
            Client {
                id: id.clone(),
                url,
                controlled: false,
                sender,
            },
        );
        (id, receiver)
    }

    /// Remove a page (tab closed).
    pub fn disconnect(&mut self, id: &str) -> bool {
        self.clients.remove(id).is_some()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Take control of every open page without requiring a reload.
    /// Returns the number of newly claimed pages.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    /// Send a message to every controlled page. Returns the number of
    /// deliveries; pages whose channel is gone are skipped.
    pub fn broadcast(&self, message: &ClientMessage) -> usize {
        let mut delivered = 0;
        for client in self.clients.values().filter(|c| c.controlled) {
            if client.sender.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        trace!(delivered, "broadcast to controlled clients");
        delivered
    }

    /// Number of registered pages.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no pages are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
