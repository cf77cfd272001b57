//! Validation Pipeline
//!
//! Gates every create and update before it reaches the backing store.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::entity::Entity;
use crate::error::{Result, StoreError};

// == Validator ==
/// Structural validation of a single object.
///
/// Returns a description of the first violation found.
pub trait Validator<T>: Send + Sync {
    fn validate(&self, obj: &T) -> std::result::Result<(), String>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(&T) -> std::result::Result<(), String> + Send + Sync,
{
    fn validate(&self, obj: &T) -> std::result::Result<(), String> {
        self(obj)
    }
}

/// Cross-object check: `(candidate, existing)`.
pub type StockCheck<T> = Arc<dyn Fn(&T, &T) -> std::result::Result<(), String> + Send + Sync>;

/// Runs the structural validator, then the stock check against every cached
/// object except the one stored under `key`.
///
/// The scan runs against the live map, so an object arriving through the
/// watch while it runs may be missed.
pub(crate) fn ingest_validate<T: Entity>(
    validator: Option<&Arc<dyn Validator<T>>>,
    stock_check: Option<&StockCheck<T>>,
    cache: &DashMap<String, T>,
    key: &str,
    obj: &T,
) -> Result<()> {
    if let Some(validator) = validator {
        validator.validate(obj).map_err(|reason| {
            warn!("Data validate failed for key {}: {}", key, reason);
            StoreError::ValidationFailed(reason)
        })?;
    }

    if let Some(check) = stock_check {
        for entry in cache.iter() {
            if entry.key() == key {
                continue;
            }
            if let Err(reason) = check(obj, entry.value()) {
                warn!("Stock check failed for key {}: {}", key, reason);
                return Err(StoreError::Conflict(reason));
            }
        }
    }

    Ok(())
}
