//! API Module
//!
//! HTTP handlers and routing for the admin REST API.
//!
//! # Endpoints
//! - `/apisix/admin/routes`, `/apisix/admin/consumers`, `/apisix/admin/users` - CRUD
//! - `GET /apisix/admin/tool/version` - Build version
//! - `POST /apisix/admin/reinit` - Manual reinit sweep
//! - `GET /stats` - Store statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
