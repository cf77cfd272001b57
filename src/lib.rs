//! kv_view - Materialized views over a watchable key-value store
//!
//! Keeps an in-memory copy of each resource prefix in sync through
//! list-and-watch, and serves the admin API from those copies.

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod models;
pub mod storage;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_reinit_task;
