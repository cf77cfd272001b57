//! Error types for the store engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Store Error Enum ==
/// Unified error type for the store engine and its HTTP surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No object is cached under the key
    #[error("key: {0} is not found")]
    NotFound(String),

    /// Duplicate key on create, or a stock check rejected the object
    #[error("conflict: {0}")]
    Conflict(String),

    /// The structural validator rejected the object
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// JSON encode/decode failure
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// A list, watch or write round-trip to the backing store failed
    #[error("backing store unavailable: {0}")]
    BackingStoreUnavailable(String),

    /// Construction-time misconfiguration
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// The store was closed and can no longer be initialized
    #[error("store closed: {0}")]
    Closed(String),
}

impl StoreError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            StoreError::SerializationFailed(_) | StoreError::ConfigurationInvalid(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            StoreError::BackingStoreUnavailable(_) | StoreError::Closed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse::new(self.to_string()));

        (self.status_code(), body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the store engine.
pub type Result<T> = std::result::Result<T, StoreError>;
