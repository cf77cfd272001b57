//! Store construction options.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::entity::{Entity, HubKey};
use crate::error::{Result, StoreError};
use crate::store::validate::{StockCheck, Validator};
use crate::store::PATH_SEPARATOR;

/// Default upper bound for the initial list round-trip.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Derives the logical key of an object.
pub type KeyFunc<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Returns the current time in seconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

// == Store Options ==
/// Immutable configuration of one [`GenericStore`](crate::store::GenericStore).
pub struct StoreOptions<T: Entity> {
    /// Prefix in the backing store, without a trailing separator
    pub base_path: String,
    /// Resource tag
    pub hub_key: HubKey,
    pub key_func: Option<KeyFunc<T>>,
    pub validator: Option<Arc<dyn Validator<T>>>,
    pub stock_check: Option<StockCheck<T>>,
    /// Bound on the initial list call
    pub init_timeout: Duration,
    pub clock: Clock,
}

impl<T: Entity> StoreOptions<T> {
    /// Creates options with no key function, validator or stock check.
    pub fn new(base_path: impl Into<String>, hub_key: HubKey) -> Self {
        Self {
            base_path: base_path.into(),
            hub_key,
            key_func: None,
            validator: None,
            stock_check: None,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
        }
    }

    pub fn key_func(mut self, f: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.key_func = Some(Arc::new(f));
        self
    }

    pub fn validator(mut self, validator: impl Validator<T> + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn stock_check(
        mut self,
        f: impl Fn(&T, &T) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.stock_check = Some(Arc::new(f));
        self
    }

    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    pub fn clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Rejects misconfiguration before a store is built from these options,
    /// handing back the key function that every store requires.
    pub(crate) fn check(&self) -> Result<KeyFunc<T>> {
        if self.base_path.is_empty() {
            return Err(StoreError::ConfigurationInvalid(
                "base path can not be empty".to_string(),
            ));
        }
        if self.base_path.ends_with(PATH_SEPARATOR) {
            return Err(StoreError::ConfigurationInvalid(format!(
                "base path {} must not end with '{}'",
                self.base_path, PATH_SEPARATOR
            )));
        }
        if self.init_timeout.is_zero() {
            return Err(StoreError::ConfigurationInvalid(
                "init timeout must be positive".to_string(),
            ));
        }
        self.key_func
            .clone()
            .ok_or_else(|| StoreError::ConfigurationInvalid("key func can not be empty".to_string()))
    }
}

impl<T: Entity> fmt::Debug for StoreOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("base_path", &self.base_path)
            .field("hub_key", &self.hub_key)
            .field("has_validator", &self.validator.is_some())
            .field("has_stock_check", &self.stock_check.is_some())
            .field("init_timeout", &self.init_timeout)
            .finish()
    }
}
