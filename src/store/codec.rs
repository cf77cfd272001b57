//! Object Codec
//!
//! JSON encoding between typed objects and the backing store's string values.

use std::marker::PhantomData;

use tracing::error;

use crate::entity::Entity;
use crate::error::{Result, StoreError};

/// Encodes and decodes objects of one schema type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectCodec<T> {
    _schema: PhantomData<fn() -> T>,
}

impl<T: Entity> ObjectCodec<T> {
    pub fn new() -> Self {
        Self {
            _schema: PhantomData,
        }
    }

    pub fn encode(&self, obj: &T) -> Result<String> {
        serde_json::to_string(obj).map_err(|err| {
            error!("json marshal failed: {}", err);
            StoreError::SerializationFailed(format!("json marshal failed: {}", err))
        })
    }

    /// Decodes a stored value. `key` is the logical key it was stored under
    /// and becomes the object's id when the document carries none.
    pub fn decode(&self, raw: &str, key: &str) -> Result<T> {
        let mut obj: T = serde_json::from_str(raw).map_err(|err| {
            StoreError::SerializationFailed(format!(
                "json unmarshal failed, related key: {}, error: {}",
                key, err
            ))
        })?;

        if let Some(info) = obj.base_info_mut() {
            info.key_compat(key);
        }

        Ok(obj)
    }
}
