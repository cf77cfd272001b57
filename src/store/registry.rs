//! Store Registry Module
//!
//! Type-erased access to stores, the reinit queue fed by failed watches, and
//! the hub that maps resource tags to stores.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::entity::HubKey;
use crate::error::{Result, StoreError};
use crate::store::{StoreState, StoreStatsSnapshot};

// == Managed Store ==
/// The lifecycle surface of a store, independent of its schema type.
#[async_trait]
pub trait ManagedStore: Send + Sync + 'static {
    fn hub_key(&self) -> HubKey;
    fn state(&self) -> StoreState;
    fn stats(&self) -> StoreStatsSnapshot;
    async fn init(&self) -> Result<()>;
    fn close(&self);
}

// == Reinit Handle ==
/// Sending side of the reinit queue, held by every store's watch task.
#[derive(Clone)]
pub struct ReinitHandle {
    tx: mpsc::UnboundedSender<Arc<dyn ManagedStore>>,
    pending: Arc<AtomicUsize>,
}

impl ReinitHandle {
    /// Queues a store whose watch broke.
    pub fn report(&self, store: Arc<dyn ManagedStore>) {
        let hub_key = store.hub_key();
        if self.tx.send(store).is_ok() {
            self.pending.fetch_add(1, Ordering::SeqCst);
        } else {
            warn!("Reinit registry is gone, dropping reinit request for {}", hub_key);
        }
    }
}

// == Reinit Registry ==
/// Collects stores that need a fresh list-and-watch and reinitializes them
/// when drained.
///
/// Watch tasks only ever report; recovery happens when an outside driver
/// (the periodic sweep or an admin call) invokes [`ReinitRegistry::reinit`].
pub struct ReinitRegistry {
    handle: ReinitHandle,
    rx: Mutex<mpsc::UnboundedReceiver<Arc<dyn ManagedStore>>>,
}

impl Default for ReinitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReinitRegistry {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: ReinitHandle {
                tx,
                pending: Arc::new(AtomicUsize::new(0)),
            },
            rx: Mutex::new(rx),
        }
    }

    pub fn handle(&self) -> ReinitHandle {
        self.handle.clone()
    }

    /// Number of queued reinit requests.
    pub fn pending(&self) -> usize {
        self.handle.pending.load(Ordering::SeqCst)
    }

    /// Drains the queue, reinitializing each store in report order.
    ///
    /// Stops at the first failure; the failing store is queued again so a
    /// later sweep retries it. Closed stores are dropped. Returns the number
    /// of stores reinitialized.
    pub async fn reinit(&self) -> Result<usize> {
        let mut rx = self.rx.lock().await;
        let mut reinitialized = 0;

        while let Ok(store) = rx.try_recv() {
            self.handle.pending.fetch_sub(1, Ordering::SeqCst);

            if store.state() == StoreState::Closed {
                info!("Skipping reinit of closed store {}", store.hub_key());
                continue;
            }

            info!("Reinitializing store {}", store.hub_key());
            match store.init().await {
                Ok(()) => reinitialized += 1,
                // Closed while it waited in the queue
                Err(StoreError::Closed(_)) => {
                    info!("Skipping reinit of closed store {}", store.hub_key());
                }
                Err(err) => {
                    error!("Reinit of store {} failed: {}", store.hub_key(), err);
                    self.handle.report(store);
                    return Err(err);
                }
            }
        }

        Ok(reinitialized)
    }
}

// == Store Hub ==
/// Maps resource tags to stores.
#[derive(Default)]
pub struct StoreHub {
    stores: DashMap<HubKey, Arc<dyn ManagedStore>>,
}

impl StoreHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a store. A tag can be registered once.
    pub fn register(&self, store: Arc<dyn ManagedStore>) -> Result<()> {
        let hub_key = store.hub_key();
        if self.stores.contains_key(&hub_key) {
            return Err(StoreError::ConfigurationInvalid(format!(
                "store {} is already registered",
                hub_key
            )));
        }
        self.stores.insert(hub_key, store);
        Ok(())
    }

    pub fn get(&self, hub_key: HubKey) -> Option<Arc<dyn ManagedStore>> {
        self.stores.get(&hub_key).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered stores ordered by tag.
    fn ordered(&self) -> Vec<Arc<dyn ManagedStore>> {
        let by_key: BTreeMap<&'static str, Arc<dyn ManagedStore>> = self
            .stores
            .iter()
            .map(|entry| (entry.key().as_str(), Arc::clone(entry.value())))
            .collect();
        by_key.into_values().collect()
    }

    /// Initializes every store, failing on the first error.
    pub async fn init_all(&self) -> Result<()> {
        for store in self.ordered() {
            store.init().await?;
            info!("Store {} initialized", store.hub_key());
        }
        Ok(())
    }

    pub fn close_all(&self) {
        for store in self.ordered() {
            store.close();
        }
    }

    /// State and counters of every store.
    pub fn stats(&self) -> Vec<(HubKey, StoreState, StoreStatsSnapshot)> {
        self.ordered()
            .into_iter()
            .map(|store| (store.hub_key(), store.state(), store.stats()))
            .collect()
    }
}
