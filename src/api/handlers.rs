//! API Handlers
//!
//! HTTP request handlers. Resource handlers are generic over the entity
//! type and call straight into its store.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::config::Config;
use crate::entity::{Consumer, Entity, Route, User};
use crate::error::{Result, StoreError};
use crate::models::{
    DeleteResponse, HealthResponse, ListQuery, ReinitResponse, StatsResponse, VersionResponse,
};
use crate::storage::Storage;
use crate::store::{GenericStore, ListInput, ListOutput, ReinitRegistry, StoreHub};

// == Resource ==
/// What the HTTP layer needs from an entity beyond storage.
pub trait Resource: Entity {
    /// Value matched by the `name` list filter.
    fn display_name(&self) -> &str;

    /// Makes the object's logical key equal to a key taken from the path.
    fn set_key(&mut self, key: &str);
}

impl Resource for Route {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn set_key(&mut self, key: &str) {
        self.base.id = Some(key.to_string());
    }
}

impl Resource for Consumer {
    fn display_name(&self) -> &str {
        &self.username
    }

    fn set_key(&mut self, key: &str) {
        self.username = key.to_string();
    }
}

impl Resource for User {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn set_key(&mut self, key: &str) {
        self.base.id = Some(key.to_string());
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: GenericStore<Route>,
    pub consumers: GenericStore<Consumer>,
    pub users: GenericStore<User>,
    /// Every store above, by resource tag
    pub hub: Arc<StoreHub>,
    pub reinit: Arc<ReinitRegistry>,
}

impl AppState {
    /// Builds one store per resource over `storage` and registers them.
    ///
    /// Stores start uninitialized; call [`AppState::init`] before serving.
    pub fn new(storage: Arc<dyn Storage>, config: &Config) -> Result<Self> {
        let reinit = Arc::new(ReinitRegistry::new());
        let prefix = config.store_prefix.as_str();
        let timeout = config.init_timeout();

        let routes = GenericStore::new(
            Route::store_options(prefix).init_timeout(timeout),
            storage.clone(),
            reinit.handle(),
        )?;
        let consumers = GenericStore::new(
            Consumer::store_options(prefix).init_timeout(timeout),
            storage.clone(),
            reinit.handle(),
        )?;
        let users = GenericStore::new(
            User::store_options(prefix).init_timeout(timeout),
            storage,
            reinit.handle(),
        )?;

        let hub = Arc::new(StoreHub::new());
        hub.register(Arc::new(routes.clone()))?;
        hub.register(Arc::new(consumers.clone()))?;
        hub.register(Arc::new(users.clone()))?;

        Ok(Self {
            routes,
            consumers,
            users,
            hub,
            reinit,
        })
    }

    /// Loads every store and starts their watches.
    pub async fn init(&self) -> Result<()> {
        self.hub.init_all().await
    }

    /// Stops every watch.
    pub fn close(&self) {
        self.hub.close_all();
    }
}

/// Handler for GET /apisix/admin/{resource}
///
/// Lists objects, optionally filtered by name and paginated.
pub async fn list_handler<T: Resource>(
    State(store): State<GenericStore<T>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListOutput<T>>> {
    if let Some(error_msg) = query.validate() {
        return Err(StoreError::ValidationFailed(error_msg));
    }

    let mut input = ListInput::new().page(query.page, query.page_size);
    if let Some(name) = query.name.filter(|name| !name.is_empty()) {
        input = input.predicate(move |obj: &T| obj.display_name().contains(name.as_str()));
    }

    Ok(Json(store.list(input)))
}

/// Handler for GET /apisix/admin/{resource}/:id
pub async fn get_handler<T: Resource>(
    State(store): State<GenericStore<T>>,
    Path(id): Path<String>,
) -> Result<Json<T>> {
    Ok(Json(store.get(&id)?))
}

/// Handler for POST /apisix/admin/{resource}
///
/// The object becomes readable once the backing store's watch reports it.
pub async fn create_handler<T: Resource>(
    State(store): State<GenericStore<T>>,
    Json(obj): Json<T>,
) -> Result<Json<T>> {
    Ok(Json(store.create(obj).await?))
}

/// Handler for PUT /apisix/admin/{resource}/:id
///
/// Updates the object, creating it when it does not exist yet. The key in
/// the path wins over the one in the body.
pub async fn update_handler<T: Resource>(
    State(store): State<GenericStore<T>>,
    Path(id): Path<String>,
    Json(mut obj): Json<T>,
) -> Result<Json<T>> {
    obj.set_key(&id);
    Ok(Json(store.update(obj, true).await?))
}

/// Handler for DELETE /apisix/admin/{resource}/:id
///
/// Accepts a comma separated list of keys and deletes them in one batch.
pub async fn delete_handler<T: Resource>(
    State(store): State<GenericStore<T>>,
    Path(ids): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let keys: Vec<String> = ids
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();
    if keys.is_empty() {
        return Err(StoreError::ValidationFailed("no key given".to_string()));
    }

    store.batch_delete(&keys).await?;
    Ok(Json(DeleteResponse::new(keys)))
}

/// Handler for POST /apisix/admin/reinit
///
/// Reinitializes every store whose watch broke, without waiting for the
/// periodic sweep.
pub async fn reinit_handler(State(state): State<AppState>) -> Result<Json<ReinitResponse>> {
    let reinitialized = state.reinit.reinit().await?;
    Ok(Json(ReinitResponse { reinitialized }))
}

/// Handler for GET /apisix/admin/tool/version
pub async fn version_handler() -> Json<VersionResponse> {
    Json(VersionResponse::current())
}

/// Handler for GET /stats
///
/// Returns state and reconciliation counters of every store.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(state.hub.stats(), state.reinit.pending()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
