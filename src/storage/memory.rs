//! In-memory backing store.
//!
//! Keeps every record in an ordered map, stamps each change with a
//! monotonically increasing revision, and retains a bounded window of recent
//! events so watches can resume from a revision inside that window.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::{EventType, KeyValue, ListResult, Storage, WatchEvent, WatchResponse, WatchStream};
use crate::error::{Result, StoreError};

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<WatchResponse>,
    shutdown: watch::Receiver<bool>,
}

impl Watcher {
    fn is_done(&self) -> bool {
        self.tx.is_closed() || *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }
}

/// Events kept for watch replay by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

struct Inner {
    data: BTreeMap<String, String>,
    revision: i64,
    history: VecDeque<(i64, WatchEvent)>,
    history_limit: usize,
    /// Highest revision whose events were dropped from `history`
    compacted: i64,
    watchers: Vec<Watcher>,
    unavailable: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            data: BTreeMap::new(),
            revision: 0,
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            compacted: 0,
            watchers: Vec::new(),
            unavailable: false,
        }
    }
}

impl Inner {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(StoreError::BackingStoreUnavailable(
                "memory storage is offline".to_string(),
            ));
        }
        Ok(())
    }

    /// Records a batch of events under one new revision and fans it out.
    fn commit(&mut self, events: Vec<WatchEvent>) {
        self.revision += 1;
        let revision = self.revision;
        self.history
            .extend(events.iter().cloned().map(|event| (revision, event)));
        self.compact();

        self.watchers.retain(|w| !w.is_done());
        for watcher in &self.watchers {
            let matching: Vec<WatchEvent> = events
                .iter()
                .filter(|e| e.key.starts_with(&watcher.prefix))
                .cloned()
                .collect();
            if !matching.is_empty() {
                // A closed receiver is pruned on the next commit
                let _ = watcher.tx.send(WatchResponse::events(matching));
            }
        }
    }

    /// Drops the oldest revisions until the window fits the limit. A
    /// revision is always dropped as a whole.
    fn compact(&mut self) {
        while self.history.len() > self.history_limit {
            let Some((oldest, _)) = self.history.pop_front() else {
                break;
            };
            while self.history.front().is_some_and(|(rev, _)| *rev == oldest) {
                self.history.pop_front();
            }
            self.compacted = oldest;
        }
    }
}

// == Memory Storage ==
/// A [`Storage`] that lives entirely in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage that keeps at most `limit` events for watch replay.
    /// Watches starting before the retained window fail as compacted.
    pub fn with_history_limit(limit: usize) -> Self {
        let storage = Self::default();
        storage.inner.lock().history_limit = limit;
        storage
    }

    /// Highest revision no longer available for replay.
    pub fn compacted_revision(&self) -> i64 {
        self.inner.lock().compacted
    }

    /// Current store revision.
    pub fn revision(&self) -> i64 {
        self.inner.lock().revision
    }

    /// Raw value stored at a full key.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.lock().data.get(key).cloned()
    }

    /// Every record under `prefix`, ordered by key.
    pub fn snapshot(&self, prefix: &str) -> Vec<KeyValue> {
        self.inner
            .lock()
            .data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(key, value)| KeyValue {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }

    /// Number of live watch subscriptions.
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.watchers.retain(|w| !w.is_done());
        inner.watchers.len()
    }

    /// Ends every live watch with a canceled batch.
    pub fn fail_watches(&self, reason: &str) {
        let mut inner = self.inner.lock();
        warn!("Failing {} watch stream(s): {}", inner.watchers.len(), reason);
        for watcher in inner.watchers.drain(..) {
            let _ = watcher.tx.send(WatchResponse::canceled(reason));
        }
    }

    /// Toggles availability; while offline every call fails.
    pub fn set_available(&self, available: bool) {
        self.inner.lock().unavailable = !available;
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list(&self, prefix: &str) -> Result<ListResult> {
        let inner = self.inner.lock();
        inner.check_available()?;

        let kvs = inner
            .data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(key, value)| KeyValue {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();

        Ok(ListResult {
            kvs,
            revision: inner.revision,
        })
    }

    async fn watch(
        &self,
        prefix: &str,
        start_revision: i64,
        shutdown: watch::Receiver<bool>,
    ) -> Result<WatchStream> {
        let mut inner = self.inner.lock();
        inner.check_available()?;

        if inner.compacted > 0 && start_revision <= inner.compacted {
            warn!(
                "Watch on {} from revision {} refused, compacted up to {}",
                prefix, start_revision, inner.compacted
            );
            return Err(StoreError::BackingStoreUnavailable(format!(
                "required revision {} has been compacted",
                start_revision
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();

        // Replay under the same lock as registration so nothing slips between
        let first = inner
            .history
            .partition_point(|(rev, _)| *rev < start_revision);
        let replay: Vec<WatchEvent> = inner
            .history
            .range(first..)
            .filter(|(_, e)| e.key.starts_with(prefix))
            .map(|(_, e)| e.clone())
            .collect();
        if !replay.is_empty() {
            debug!("Replaying {} event(s) for watch on {}", replay.len(), prefix);
            let _ = tx.send(WatchResponse::events(replay));
        }

        inner.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
            shutdown,
        });
        Ok(rx)
    }

    async fn create(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;

        if inner.data.contains_key(key) {
            return Err(StoreError::Conflict(format!("key: {} already exists", key)));
        }
        inner.data.insert(key.to_string(), value.to_string());
        inner.commit(vec![WatchEvent {
            event_type: EventType::Put,
            key: key.to_string(),
            value: value.to_string(),
        }]);
        Ok(())
    }

    async fn update(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;

        inner.data.insert(key.to_string(), value.to_string());
        inner.commit(vec![WatchEvent {
            event_type: EventType::Put,
            key: key.to_string(),
            value: value.to_string(),
        }]);
        Ok(())
    }

    async fn batch_delete(&self, keys: &[String]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;

        if let Some(missing) = keys.iter().find(|k| !inner.data.contains_key(k.as_str())) {
            return Err(StoreError::NotFound(missing.clone()));
        }

        let events = keys
            .iter()
            .filter_map(|key| {
                inner.data.remove(key).map(|_| WatchEvent {
                    event_type: EventType::Delete,
                    key: key.clone(),
                    value: String::new(),
                })
            })
            .collect::<Vec<_>>();
        if !events.is_empty() {
            inner.commit(events);
        }
        Ok(())
    }
}
