//! Generic Store Module
//!
//! The cache engine: a concurrent map of decoded objects kept in sync with
//! one prefix of the backing store by an initial list and a watch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::entity::{Entity, HubKey};
use crate::error::{Result, StoreError};
use crate::storage::{EventType, Storage, WatchEvent, WatchStream};
use crate::store::list::{default_less, paginate, sort_rows};
use crate::store::registry::{ManagedStore, ReinitHandle};
use crate::store::validate::ingest_validate;
use crate::store::{
    KeyFunc, ListInput, ListOutput, ObjectCodec, StoreOptions, StoreStats, StoreStatsSnapshot,
    PATH_SEPARATOR,
};

// == Store State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    Uninitialized,
    Loading,
    Watching,
    /// The watch broke; waiting for the reinit registry
    Reinitializing,
    Closed,
}

struct StoreInner<T: Entity> {
    storage: Arc<dyn Storage>,
    opts: StoreOptions<T>,
    key_func: KeyFunc<T>,
    codec: ObjectCodec<T>,
    cache: DashMap<String, T>,
    init_lock: tokio::sync::Mutex<()>,
    state: RwLock<StoreState>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    closing: AtomicBool,
    reinit: ReinitHandle,
    stats: StoreStats,
}

// == Generic Store ==
/// In-memory view of one resource type.
///
/// Reads are served from the map only. Writes go to the backing store and
/// become visible once the watch delivers them. Cloning is cheap and every
/// clone shares the same cache.
pub struct GenericStore<T: Entity> {
    inner: Arc<StoreInner<T>>,
}

impl<T: Entity> Clone for GenericStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity> GenericStore<T> {
    // == Constructor ==
    /// Creates an uninitialized store.
    ///
    /// # Arguments
    /// * `opts` - Immutable store configuration
    /// * `storage` - Backing store adapter
    /// * `reinit` - Where the watch task reports itself when the watch breaks
    pub fn new(
        opts: StoreOptions<T>,
        storage: Arc<dyn Storage>,
        reinit: ReinitHandle,
    ) -> Result<Self> {
        let key_func = match opts.check() {
            Ok(key_func) => key_func,
            Err(err) => {
                error!("Invalid store options {:?}: {}", opts, err);
                return Err(err);
            }
        };

        Ok(Self {
            inner: Arc::new(StoreInner {
                storage,
                opts,
                key_func,
                codec: ObjectCodec::new(),
                cache: DashMap::new(),
                init_lock: tokio::sync::Mutex::new(()),
                state: RwLock::new(StoreState::Uninitialized),
                shutdown: Mutex::new(None),
                closing: AtomicBool::new(false),
                reinit,
                stats: StoreStats::new(),
            }),
        })
    }

    pub fn hub_key(&self) -> HubKey {
        self.inner.opts.hub_key
    }

    pub fn state(&self) -> StoreState {
        *self.inner.state.read()
    }

    /// Moves to `state` unless the store is closed. Only `close` leaves
    /// `Closed` in place, and nothing leaves it.
    fn set_state(&self, state: StoreState) -> bool {
        let mut current = self.inner.state.write();
        if *current == StoreState::Closed {
            return false;
        }
        *current = state;
        true
    }

    fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cache.is_empty()
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        self.inner.stats.snapshot(self.len())
    }

    /// Logical key of an object.
    pub fn key_of(&self, obj: &T) -> String {
        (self.inner.key_func)(obj)
    }

    /// Full storage path of a logical key.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}{}", self.inner.opts.base_path, PATH_SEPARATOR, key)
    }

    fn watch_prefix(&self) -> String {
        format!("{}{}", self.inner.opts.base_path, PATH_SEPARATOR)
    }

    /// Strips the base path from a storage key.
    fn logical_key<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key
            .strip_prefix(self.inner.opts.base_path.as_str())
            .and_then(|rest| rest.strip_prefix(PATH_SEPARATOR))
    }

    // == Init ==
    /// Loads the prefix and starts the watch.
    ///
    /// Concurrent calls are serialized; once the store is watching, further
    /// calls return immediately. A record that fails to decode aborts the
    /// whole load and leaves the cache as it was.
    pub async fn init(&self) -> Result<()> {
        let _guard = self.inner.init_lock.lock().await;

        let previous = self.state();
        match previous {
            StoreState::Watching => {
                debug!("Store {} is already watching", self.hub_key());
                return Ok(());
            }
            StoreState::Closed => {
                return Err(StoreError::Closed(self.hub_key().to_string()));
            }
            _ => {}
        }
        if self.is_closing() || !self.set_state(StoreState::Loading) {
            return Err(StoreError::Closed(self.hub_key().to_string()));
        }

        if let Err(err) = self.list_and_watch().await {
            error!(
                "Error occurred while initializing store {} at {}: {}",
                self.hub_key(),
                self.inner.opts.base_path,
                err
            );
            self.set_state(previous);
            return Err(err);
        }
        Ok(())
    }

    async fn list_and_watch(&self) -> Result<()> {
        let prefix = self.watch_prefix();
        let timeout = self.inner.opts.init_timeout;

        let listed = tokio::time::timeout(timeout, self.inner.storage.list(&prefix))
            .await
            .map_err(|_| {
                StoreError::BackingStoreUnavailable(format!(
                    "list {} timed out after {:?}",
                    prefix, timeout
                ))
            })??;
        self.ensure_open()?;

        // Decode everything before touching the cache
        let mut loaded = HashMap::with_capacity(listed.kvs.len());
        for kv in &listed.kvs {
            let Some(path_key) = self.logical_key(&kv.key) else {
                warn!("Ignoring key {} outside of {}", kv.key, prefix);
                continue;
            };
            let obj = self.inner.codec.decode(&kv.value, path_key)?;
            loaded.insert(self.key_of(&obj), obj);
        }

        let count = loaded.len();
        self.inner.cache.retain(|key, _| loaded.contains_key(key));
        for (key, obj) in loaded {
            self.inner.cache.insert(key, obj);
        }
        self.inner.stats.record_load();
        info!(
            "Store {} loaded {} object(s) at revision {}",
            self.hub_key(),
            count,
            listed.revision
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let events = self
            .inner
            .storage
            .watch(&prefix, listed.revision + 1, shutdown_rx.clone())
            .await?;

        {
            // `close` raises the flag before it takes the sender, so under
            // this lock either we see the flag or it sees our sender.
            let mut slot = self.inner.shutdown.lock();
            self.ensure_open()?;
            *slot = Some(shutdown_tx);
            self.set_state(StoreState::Watching);
        }

        let store = self.clone();
        tokio::spawn(async move {
            store.watch_loop(events, shutdown_rx).await;
        });

        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closing() {
            info!("Store {} was closed during init", self.hub_key());
            return Err(StoreError::Closed(self.hub_key().to_string()));
        }
        Ok(())
    }

    // == Watch ==
    async fn watch_loop(self, mut events: WatchStream, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Watch of store {} shut down", self.hub_key());
                        break;
                    }
                }
                next = events.recv() => match next {
                    Some(response) if response.canceled => {
                        warn!(
                            "Watch of store {} failed: {}",
                            self.hub_key(),
                            response.error.as_deref().unwrap_or("canceled")
                        );
                        break;
                    }
                    Some(response) => self.apply_events(response.events),
                    None => {
                        warn!("Watch stream of store {} ended", self.hub_key());
                        break;
                    }
                }
            }
        }

        self.on_watch_exit();
    }

    /// Applies one batch in order. A put that fails to decode is skipped.
    fn apply_events(&self, events: Vec<WatchEvent>) {
        for event in events {
            let Some(key) = self.logical_key(&event.key) else {
                warn!("Ignoring event for key {} outside of store", event.key);
                continue;
            };

            match event.event_type {
                EventType::Put => match self.inner.codec.decode(&event.value, key) {
                    Ok(obj) => {
                        debug!("Store {} put {}", self.hub_key(), key);
                        self.inner.cache.insert(key.to_string(), obj);
                        self.inner.stats.record_put();
                    }
                    Err(err) => {
                        warn!("Value convert to obj failed: {}", err);
                        self.inner.stats.record_decode_failure();
                    }
                },
                EventType::Delete => {
                    debug!("Store {} delete {}", self.hub_key(), key);
                    self.inner.cache.remove(key);
                    self.inner.stats.record_delete();
                }
            }
        }
    }

    fn on_watch_exit(self) {
        {
            // Only a watching store may become reinitializing; `close` flips
            // the flag before it takes this lock.
            let mut state = self.inner.state.write();
            if self.is_closing() || *state != StoreState::Watching {
                debug!("Watch of store {} closed", self.hub_key());
                return;
            }
            *state = StoreState::Reinitializing;
        }

        error!(
            "Watch exception closed, restarting: resource: {}",
            self.hub_key()
        );
        self.inner.stats.record_watch_failure();
        let reinit = self.inner.reinit.clone();
        reinit.report(Arc::new(self));
    }

    // == Close ==
    /// Stops the watch. The store is not reported for reinit afterwards.
    pub fn close(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        if let Some(shutdown) = self.inner.shutdown.lock().take() {
            let _ = shutdown.send(true);
        }
        *self.inner.state.write() = StoreState::Closed;
        info!("Store {} closed", self.hub_key());
    }

    // == Get ==
    /// Returns the cached object stored under `key`.
    pub fn get(&self, key: &str) -> Result<T> {
        match self.inner.cache.get(key) {
            Some(entry) => Ok(entry.value().clone()),
            None => {
                warn!("data not found by key: {}", key);
                Err(StoreError::NotFound(key.to_string()))
            }
        }
    }

    // == List ==
    /// Filters, projects, sorts and paginates a snapshot of the cache.
    pub fn list(&self, input: ListInput<T>) -> ListOutput<T> {
        let mut rows: Vec<(String, T)> = self
            .inner
            .cache
            .iter()
            .filter(|entry| {
                input
                    .predicate
                    .as_ref()
                    .map_or(true, |predicate| predicate(entry.value()))
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        if let Some(format) = &input.format {
            rows = rows
                .into_iter()
                .map(|(key, obj)| (key, format(obj)))
                .collect();
        }

        match &input.less {
            Some(less) => sort_rows(&mut rows, less.as_ref()),
            None => sort_rows(&mut rows, &default_less::<T>),
        }

        let total_size = rows.len();
        let rows = paginate(rows, input.page_number, input.page_size)
            .into_iter()
            .map(|(_, obj)| obj)
            .collect();

        ListOutput { rows, total_size }
    }

    // == Range ==
    /// Visits every cached object until `visitor` returns false.
    ///
    /// The visitor runs while parts of the map are locked and must not write
    /// to this store.
    pub fn range(&self, mut visitor: impl FnMut(&str, &T) -> bool) {
        for entry in self.inner.cache.iter() {
            if !visitor(entry.key(), entry.value()) {
                break;
            }
        }
    }

    fn validate(&self, key: &str, obj: &T) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::ValidationFailed("key is required".to_string()));
        }
        if key.contains(PATH_SEPARATOR) {
            return Err(StoreError::ValidationFailed(format!(
                "key {} must not contain '{}'",
                key, PATH_SEPARATOR
            )));
        }
        ingest_validate(
            self.inner.opts.validator.as_ref(),
            self.inner.opts.stock_check.as_ref(),
            &self.inner.cache,
            key,
            obj,
        )
    }

    // == Create ==
    /// Validates and writes a new object.
    ///
    /// The object shows up in the cache once the watch delivers the write.
    pub async fn create(&self, mut obj: T) -> Result<T> {
        let now = (self.inner.opts.clock)();
        if let Some(info) = obj.base_info_mut() {
            info.creating(now);
        }

        let key = self.key_of(&obj);
        self.validate(&key, &obj)?;

        if self.inner.cache.contains_key(&key) {
            warn!("key: {} is conflicted", key);
            return Err(StoreError::Conflict(format!("key: {} is conflicted", key)));
        }

        let raw = self.inner.codec.encode(&obj)?;
        self.inner
            .storage
            .create(&self.storage_key(&key), &raw)
            .await?;

        Ok(obj)
    }

    // == Update ==
    /// Validates and overwrites an existing object.
    ///
    /// Missing objects are created when `create_if_missing` is set and
    /// rejected with `NotFound` otherwise.
    pub async fn update(&self, mut obj: T, create_if_missing: bool) -> Result<T> {
        let key = self.key_of(&obj);
        self.validate(&key, &obj)?;

        let stored = self
            .inner
            .cache
            .get(&key)
            .map(|entry| entry.value().base_info().cloned());
        let stored_info = match stored {
            Some(info) => info,
            None => {
                if create_if_missing {
                    return self.create(obj).await;
                }
                warn!("key: {} is not found", key);
                return Err(StoreError::NotFound(key));
            }
        };

        let now = (self.inner.opts.clock)();
        if let (Some(info), Some(stored)) = (obj.base_info_mut(), stored_info.as_ref()) {
            info.updating(stored, now);
        }

        let raw = self.inner.codec.encode(&obj)?;
        self.inner
            .storage
            .update(&self.storage_key(&key), &raw)
            .await?;

        Ok(obj)
    }

    // == Batch Delete ==
    /// Deletes objects by logical key in one backing store call.
    ///
    /// Cache entries go away when the watch delivers the deletes.
    pub async fn batch_delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let storage_keys: Vec<String> = keys.iter().map(|key| self.storage_key(key)).collect();
        self.inner.storage.batch_delete(&storage_keys).await
    }
}

#[async_trait]
impl<T: Entity> ManagedStore for GenericStore<T> {
    fn hub_key(&self) -> HubKey {
        GenericStore::hub_key(self)
    }

    fn state(&self) -> StoreState {
        GenericStore::state(self)
    }

    fn stats(&self) -> StoreStatsSnapshot {
        GenericStore::stats(self)
    }

    async fn init(&self) -> Result<()> {
        GenericStore::init(self).await
    }

    fn close(&self) {
        GenericStore::close(self)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;
    use std::time::Duration;

    use crate::entity::Route;
    use crate::storage::{ListResult, MemoryStorage};
    use crate::store::ReinitRegistry;

    const BASE: &str = "/test/routes";

    fn options(clock: Arc<AtomicI64>) -> StoreOptions<Route> {
        StoreOptions::new(BASE, HubKey::Route)
            .key_func(|r: &Route| r.base.id.clone().unwrap_or_default())
            .clock(move || clock.load(Ordering::SeqCst))
    }

    struct Fixture {
        storage: Arc<MemoryStorage>,
        registry: ReinitRegistry,
        clock: Arc<AtomicI64>,
        store: GenericStore<Route>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let registry = ReinitRegistry::new();
        let clock = Arc::new(AtomicI64::new(1_000));
        let store =
            GenericStore::new(options(clock.clone()), storage.clone(), registry.handle()).unwrap();
        Fixture {
            storage,
            registry,
            clock,
            store,
        }
    }

    fn route(id: &str, name: &str) -> Route {
        let mut route = Route::new(name, "/hello");
        route.base.id = Some(id.to_string());
        route
    }

    /// Polls until `check` holds or two seconds pass.
    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_new_rejects_bad_options() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let registry = ReinitRegistry::new();

        let no_base = StoreOptions::<Route>::new("", HubKey::Route).key_func(|_| "k".into());
        assert!(matches!(
            GenericStore::new(no_base, storage.clone(), registry.handle()),
            Err(StoreError::ConfigurationInvalid(_))
        ));

        let no_key = StoreOptions::<Route>::new(BASE, HubKey::Route);
        assert!(matches!(
            GenericStore::new(no_key, storage.clone(), registry.handle()),
            Err(StoreError::ConfigurationInvalid(_))
        ));

        let trailing = StoreOptions::<Route>::new("/a/", HubKey::Route).key_func(|_| "k".into());
        assert!(matches!(
            GenericStore::new(trailing, storage, registry.handle()),
            Err(StoreError::ConfigurationInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_init_loads_existing_records() {
        let f = fixture();
        f.storage
            .create(&format!("{}/a", BASE), r#"{"name":"first","uri":"/a"}"#)
            .await
            .unwrap();
        f.storage
            .create("/test/routes-other/b", r#"{"name":"other","uri":"/b"}"#)
            .await
            .unwrap();

        f.store.init().await.unwrap();
        assert_eq!(f.store.state(), StoreState::Watching);
        assert_eq!(f.store.len(), 1);

        // Id filled from the storage key
        let loaded = f.store.get("a").unwrap();
        assert_eq!(loaded.name, "first");
        assert_eq!(loaded.base.id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_init_fails_on_bad_record() {
        let f = fixture();
        f.storage
            .create(&format!("{}/good", BASE), r#"{"name":"g","uri":"/g"}"#)
            .await
            .unwrap();
        f.storage
            .create(&format!("{}/bad", BASE), "{broken")
            .await
            .unwrap();

        let result = f.store.init().await;
        assert!(matches!(result, Err(StoreError::SerializationFailed(_))));
        assert!(f.store.is_empty());
        assert_eq!(f.store.state(), StoreState::Uninitialized);
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let f = fixture();
        f.store.init().await.unwrap();
        f.store.init().await.unwrap();

        assert_eq!(f.store.stats().loads, 1);
        assert_eq!(f.storage.watcher_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_init_loads_once() {
        let f = fixture();
        let (a, b) = tokio::join!(f.store.init(), f.store.init());
        a.unwrap();
        b.unwrap();
        assert_eq!(f.store.stats().loads, 1);
    }

    #[tokio::test]
    async fn test_init_times_out() {
        struct SlowStorage;

        #[async_trait]
        impl Storage for SlowStorage {
            async fn list(&self, _prefix: &str) -> Result<ListResult> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ListResult::default())
            }
            async fn watch(
                &self,
                _prefix: &str,
                _start_revision: i64,
                _shutdown: watch::Receiver<bool>,
            ) -> Result<WatchStream> {
                Err(StoreError::BackingStoreUnavailable("unused".into()))
            }
            async fn create(&self, _key: &str, _value: &str) -> Result<()> {
                Ok(())
            }
            async fn update(&self, _key: &str, _value: &str) -> Result<()> {
                Ok(())
            }
            async fn batch_delete(&self, _keys: &[String]) -> Result<()> {
                Ok(())
            }
        }

        let registry = ReinitRegistry::new();
        let opts = StoreOptions::<Route>::new(BASE, HubKey::Route)
            .key_func(|r: &Route| r.name.clone())
            .init_timeout(Duration::from_millis(50));
        let store = GenericStore::new(opts, Arc::new(SlowStorage), registry.handle()).unwrap();

        let result = store.init().await;
        assert!(matches!(result, Err(StoreError::BackingStoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_create_visible_after_watch() {
        let f = fixture();
        f.store.init().await.unwrap();

        let created = f.store.create(Route::new("r1", "/hello")).await.unwrap();
        let id = created.base.id.clone().unwrap();
        assert_eq!(created.base.create_time, 1_000);
        assert_eq!(created.base.update_time, 1_000);

        eventually(|| f.store.get(&id).is_ok()).await;
        let cached = f.store.get(&id).unwrap();
        assert_eq!(cached, created);
    }

    #[tokio::test]
    async fn test_create_conflict_writes_nothing() {
        let f = fixture();
        f.store.init().await.unwrap();
        f.store.create(route("r1", "first")).await.unwrap();
        eventually(|| f.store.get("r1").is_ok()).await;
        let revision = f.storage.revision();

        let result = f.store.create(route("r1", "second")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(f.storage.revision(), revision);
        assert_eq!(f.store.get("r1").unwrap().name, "first");
    }

    #[tokio::test]
    async fn test_create_rejects_key_with_separator() {
        let f = fixture();
        f.store.init().await.unwrap();

        let result = f.store.create(route("a/b", "slashed")).await;
        assert!(matches!(result, Err(StoreError::ValidationFailed(_))));
        assert_eq!(f.storage.revision(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_without_create() {
        let f = fixture();
        f.store.init().await.unwrap();

        let result = f.store.update(route("ghost", "ghost"), false).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(f.storage.revision(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_with_create() {
        let f = fixture();
        f.store.init().await.unwrap();

        let created = f.store.update(route("new", "new"), true).await.unwrap();
        assert_eq!(created.base.create_time, 1_000);
        eventually(|| f.store.get("new").is_ok()).await;
    }

    #[tokio::test]
    async fn test_create_then_rename() {
        let f = fixture();
        f.store.init().await.unwrap();

        let created = f.store.create(Route::new("r1", "/hello")).await.unwrap();
        let id = created.base.id.clone().unwrap();
        eventually(|| f.store.get(&id).is_ok()).await;

        let fetched = f.store.get(&id).unwrap();
        assert_eq!(fetched.base.create_time, fetched.base.update_time);

        f.clock.store(1_005, Ordering::SeqCst);
        let mut renamed = fetched.clone();
        renamed.name = "r1-renamed".to_string();
        renamed.base.create_time = 0;
        f.store.update(renamed, false).await.unwrap();

        eventually(|| f.store.get(&id).map(|r| r.name == "r1-renamed").unwrap_or(false)).await;
        let updated = f.store.get(&id).unwrap();
        assert_eq!(updated.base.id.as_deref(), Some(id.as_str()));
        assert_eq!(updated.base.create_time, 1_000);
        assert!(updated.base.update_time > updated.base.create_time);
    }

    #[tokio::test]
    async fn test_batch_delete_via_watch() {
        let f = fixture();
        f.store.init().await.unwrap();
        f.store.create(route("a", "a")).await.unwrap();
        f.store.create(route("b", "b")).await.unwrap();
        eventually(|| f.store.len() == 2).await;

        f.store
            .batch_delete(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        eventually(|| f.store.is_empty()).await;
        assert_eq!(f.store.stats().deletes_applied, 2);
    }

    #[tokio::test]
    async fn test_batch_delete_missing_key_deletes_nothing() {
        let f = fixture();
        f.store.init().await.unwrap();
        f.store.create(route("a", "a")).await.unwrap();
        eventually(|| f.store.len() == 1).await;

        let result = f
            .store
            .batch_delete(&["a".to_string(), "missing".to_string()])
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(f.storage.raw(&format!("{}/a", BASE)).is_some());
    }

    #[tokio::test]
    async fn test_bad_watch_put_is_skipped() {
        let f = fixture();
        f.store.init().await.unwrap();
        f.store.create(route("a", "a")).await.unwrap();
        eventually(|| f.store.len() == 1).await;

        f.storage
            .update(&format!("{}/a", BASE), "{not json")
            .await
            .unwrap();
        f.store.create(route("b", "b")).await.unwrap();
        eventually(|| f.store.len() == 2).await;

        assert_eq!(f.store.get("a").unwrap().name, "a");
        assert_eq!(f.store.stats().decode_failures, 1);
        assert_eq!(f.store.state(), StoreState::Watching);
    }

    #[tokio::test]
    async fn test_watch_failure_reports_for_reinit() {
        let f = fixture();
        f.store.init().await.unwrap();

        f.storage.fail_watches("compacted");
        eventually(|| f.registry.pending() == 1).await;
        assert_eq!(f.store.state(), StoreState::Reinitializing);

        // Written while no watch is running
        f.storage
            .create(&format!("{}/late", BASE), r#"{"name":"late","uri":"/l"}"#)
            .await
            .unwrap();

        assert_eq!(f.registry.reinit().await.unwrap(), 1);
        assert_eq!(f.store.state(), StoreState::Watching);
        assert!(f.store.get("late").is_ok());

        // The fresh watch is live
        f.store.create(route("after", "after")).await.unwrap();
        eventually(|| f.store.get("after").is_ok()).await;
    }

    #[tokio::test]
    async fn test_reinit_prunes_deleted_keys() {
        let f = fixture();
        f.store.init().await.unwrap();
        f.store.create(route("gone", "gone")).await.unwrap();
        eventually(|| f.store.len() == 1).await;

        f.storage.fail_watches("lost");
        eventually(|| f.registry.pending() == 1).await;
        f.storage
            .batch_delete(&[format!("{}/gone", BASE)])
            .await
            .unwrap();
        assert_eq!(f.store.len(), 1);

        f.registry.reinit().await.unwrap();
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_close_does_not_report() {
        let f = fixture();
        f.store.init().await.unwrap();

        f.store.close();
        assert_eq!(f.store.state(), StoreState::Closed);
        f.storage.fail_watches("after close");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.registry.pending(), 0);
        assert!(matches!(f.store.init().await, Err(StoreError::Closed(_))));
    }

    #[tokio::test]
    async fn test_close_during_initial_list_wins() {
        struct DelayedList {
            inner: Arc<MemoryStorage>,
        }

        #[async_trait]
        impl Storage for DelayedList {
            async fn list(&self, prefix: &str) -> Result<ListResult> {
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.inner.list(prefix).await
            }
            async fn watch(
                &self,
                prefix: &str,
                start_revision: i64,
                shutdown: watch::Receiver<bool>,
            ) -> Result<WatchStream> {
                self.inner.watch(prefix, start_revision, shutdown).await
            }
            async fn create(&self, key: &str, value: &str) -> Result<()> {
                self.inner.create(key, value).await
            }
            async fn update(&self, key: &str, value: &str) -> Result<()> {
                self.inner.update(key, value).await
            }
            async fn batch_delete(&self, keys: &[String]) -> Result<()> {
                self.inner.batch_delete(keys).await
            }
        }

        let memory = Arc::new(MemoryStorage::new());
        let registry = ReinitRegistry::new();
        let clock = Arc::new(AtomicI64::new(1_000));
        let store = GenericStore::new(
            options(clock),
            Arc::new(DelayedList {
                inner: memory.clone(),
            }),
            registry.handle(),
        )
        .unwrap();

        let loading = store.clone();
        let init = tokio::spawn(async move { loading.init().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.close();

        let result = init.await.unwrap();
        assert!(matches!(result, Err(StoreError::Closed(_))));
        assert_eq!(store.state(), StoreState::Closed);
        assert_eq!(memory.watcher_count(), 0);
        assert_eq!(store.stats().loads, 0);
    }

    #[tokio::test]
    async fn test_watch_exit_after_close_stays_closed() {
        let f = fixture();
        f.store.init().await.unwrap();
        f.store.close();

        // The watch task finishing late must not resurrect the store
        f.store.clone().on_watch_exit();
        assert_eq!(f.store.state(), StoreState::Closed);
        assert_eq!(f.registry.pending(), 0);
        assert_eq!(f.store.stats().watch_failures, 0);
    }

    #[tokio::test]
    async fn test_queued_store_closed_before_reinit_stays_closed() {
        let f = fixture();
        f.store.init().await.unwrap();
        f.storage.fail_watches("lost leader");
        eventually(|| f.registry.pending() == 1).await;

        f.store.close();
        assert_eq!(f.registry.reinit().await.unwrap(), 0);
        assert_eq!(f.store.state(), StoreState::Closed);
        assert_eq!(f.store.stats().loads, 1);
        assert_eq!(f.storage.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_range_stops_early() {
        let f = fixture();
        f.store.init().await.unwrap();
        for id in ["a", "b", "c"] {
            f.store.create(route(id, id)).await.unwrap();
        }
        eventually(|| f.store.len() == 3).await;

        let mut visited = 0;
        f.store.range(|_, _| {
            visited += 1;
            visited < 2
        });
        assert_eq!(visited, 2);
    }

    #[tokio::test]
    async fn test_list_defaults_and_pagination() {
        let f = fixture();
        f.store.init().await.unwrap();
        for i in 0..25 {
            f.clock.store(1_000 + i, Ordering::SeqCst);
            f.store
                .create(route(&format!("r{:02}", i), &format!("route-{}", i)))
                .await
                .unwrap();
        }
        eventually(|| f.store.len() == 25).await;

        let all = f.store.list(ListInput::new());
        assert_eq!(all.total_size, 25);
        assert_eq!(all.rows[0].name, "route-0");
        assert_eq!(all.rows[24].name, "route-24");

        let page = f.store.list(ListInput::new().page(3, 10));
        assert_eq!(page.rows.len(), 5);
        assert_eq!(page.total_size, 25);

        let past_end = f.store.list(ListInput::new().page(10, 10));
        assert!(past_end.rows.is_empty());
        assert_eq!(past_end.total_size, 25);
    }

    #[tokio::test]
    async fn test_list_predicate_format_and_less() {
        let f = fixture();
        f.store.init().await.unwrap();
        for (id, name) in [("1", "alpha"), ("2", "beta"), ("3", "alphabet")] {
            f.store.create(route(id, name)).await.unwrap();
        }
        eventually(|| f.store.len() == 3).await;

        let output = f.store.list(
            ListInput::new()
                .predicate(|r: &Route| r.name.starts_with("alpha"))
                .format(|mut r: Route| {
                    r.name = r.name.to_uppercase();
                    r
                })
                .less(|a: &Route, b: &Route| b.name.cmp(&a.name)),
        );

        assert_eq!(output.total_size, 2);
        let names: Vec<&str> = output.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["ALPHABET", "ALPHA"]);
    }

    #[tokio::test]
    async fn test_stock_check_blocks_create() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = ReinitRegistry::new();
        let opts = StoreOptions::<Route>::new(BASE, HubKey::Route)
            .key_func(|r: &Route| r.base.id.clone().unwrap_or_default())
            .stock_check(|candidate: &Route, existing: &Route| {
                if candidate.name == existing.name {
                    Err(format!("route name {} exists", candidate.name))
                } else {
                    Ok(())
                }
            });
        let store = GenericStore::new(opts, storage.clone(), registry.handle()).unwrap();
        store.init().await.unwrap();

        store.create(route("1", "same")).await.unwrap();
        eventually(|| store.len() == 1).await;

        let result = store.create(route("2", "same")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // Updating the same object does not trip its own stock check
        assert!(store.update(route("1", "same"), false).await.is_ok());
    }
}
