//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::entity::HubKey;
use crate::store::{StoreState, StoreStatsSnapshot};

/// Response body for batch deletes (`DELETE /apisix/admin/{resource}/:ids`)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The keys that were deleted
    pub keys: Vec<String>,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            message: format!("{} key(s) deleted successfully", keys.len()),
            keys,
        }
    }
}

/// Per-store entry of the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatsEntry {
    pub resource: HubKey,
    pub state: StoreState,
    #[serde(flatten)]
    pub stats: StoreStatsSnapshot,
}

/// Response body for the stats endpoint (`GET /stats`)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub stores: Vec<StoreStatsEntry>,
    /// Stores waiting for reinitialization
    pub pending_reinit: usize,
}

impl StatsResponse {
    pub fn new(
        stores: Vec<(HubKey, StoreState, StoreStatsSnapshot)>,
        pending_reinit: usize,
    ) -> Self {
        Self {
            stores: stores
                .into_iter()
                .map(|(resource, state, stats)| StoreStatsEntry {
                    resource,
                    state,
                    stats,
                })
                .collect(),
            pending_reinit,
        }
    }
}

/// Response body for a manual reinit (`POST /apisix/admin/reinit`)
#[derive(Debug, Clone, Serialize)]
pub struct ReinitResponse {
    pub reinitialized: usize,
}

/// Response body for the version endpoint (`GET /apisix/admin/tool/version`)
#[derive(Debug, Clone, Serialize)]
pub struct VersionResponse {
    pub commit_hash: String,
    pub version: String,
}

impl VersionResponse {
    /// Version of this build; the hash comes from `GIT_HASH` at compile time.
    pub fn current() -> Self {
        Self {
            commit_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Response body for the health endpoint (`GET /health`)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
