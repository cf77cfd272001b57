//! Backing Store Module
//!
//! The contract the store engine expects from the remote, watchable
//! key-value store, plus an in-memory implementation of it.

mod memory;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::Result;

pub use memory::MemoryStorage;

// == Key/Value ==
/// A single record returned by a list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Full storage key (`base_path/logical_key`)
    pub key: String,
    /// Raw JSON document
    pub value: String,
}

/// Result of a prefix list: the records plus the store revision they were read at.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub kvs: Vec<KeyValue>,
    pub revision: i64,
}

// == Watch Events ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
}

/// A single change observed on a watched prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub key: String,
    /// Empty for deletes
    pub value: String,
}

/// One batch delivered by a watch stream.
///
/// A batch with `canceled` set is the last one the stream delivers.
#[derive(Debug, Clone, Default)]
pub struct WatchResponse {
    pub events: Vec<WatchEvent>,
    pub canceled: bool,
    pub error: Option<String>,
}

impl WatchResponse {
    /// Creates a batch of events.
    pub fn events(events: Vec<WatchEvent>) -> Self {
        Self {
            events,
            canceled: false,
            error: None,
        }
    }

    /// Creates the terminal batch of a failed watch.
    pub fn canceled(reason: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            canceled: true,
            error: Some(reason.into()),
        }
    }
}

/// Receiving half of a watch subscription.
pub type WatchStream = mpsc::UnboundedReceiver<WatchResponse>;

// == Storage Trait ==
/// Backing store adapter.
///
/// Keys are full storage paths. Implementations are responsible for their
/// own consistency guarantees; the engine treats them as authoritative.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Lists every record whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<ListResult>;

    /// Subscribes to changes under `prefix`, starting at `start_revision`.
    ///
    /// Events with a revision at or after `start_revision` that already
    /// happened are replayed first. The subscription ends when `shutdown`
    /// turns true or its sender is dropped.
    async fn watch(
        &self,
        prefix: &str,
        start_revision: i64,
        shutdown: watch::Receiver<bool>,
    ) -> Result<WatchStream>;

    /// Creates a record. Fails with `Conflict` if the key already exists.
    async fn create(&self, key: &str, value: &str) -> Result<()>;

    /// Writes a record, last write wins.
    async fn update(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes every key, or none of them.
    async fn batch_delete(&self, keys: &[String]) -> Result<()>;
}
