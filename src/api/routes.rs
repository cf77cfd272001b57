//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    create_handler, delete_handler, get_handler, health_handler, list_handler, reinit_handler,
    stats_handler, update_handler, version_handler, AppState, Resource,
};
use crate::store::GenericStore;

/// CRUD endpoints of one resource, bound to its store.
fn resource_router<T: Resource>(store: GenericStore<T>) -> Router<AppState> {
    Router::new()
        .route("/", get(list_handler::<T>).post(create_handler::<T>))
        .route(
            "/:id",
            get(get_handler::<T>)
                .put(update_handler::<T>)
                .delete(delete_handler::<T>),
        )
        .with_state(store)
}

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET|POST /apisix/admin/{routes,consumers,users}` - List / create
/// - `GET|PUT|DELETE /apisix/admin/{routes,consumers,users}/:id` - Read / upsert / batch delete
/// - `GET /apisix/admin/tool/version` - Build version
/// - `POST /apisix/admin/reinit` - Reinitialize stores whose watch broke
/// - `GET /stats` - Store states and counters
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .nest("/routes", resource_router(state.routes.clone()))
        .nest("/consumers", resource_router(state.consumers.clone()))
        .nest("/users", resource_router(state.users.clone()))
        .route("/tool/version", get(version_handler))
        .route("/reinit", post(reinit_handler));

    Router::new()
        .nest("/apisix/admin", admin)
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::MemoryStorage;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    async fn create_test_app() -> Router {
        let state = AppState::new(Arc::new(MemoryStorage::new()), &Config::default()).unwrap();
        state.init().await.unwrap();
        create_router(state)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/apisix/admin/tool/version")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_endpoint() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/apisix/admin/routes")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"r1","uri":"/hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/apisix/admin/users/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
