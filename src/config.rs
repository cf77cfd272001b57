//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::time::Duration;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Key prefix under which every resource is stored
    pub store_prefix: String,
    /// Upper bound in seconds for the initial list of each store
    pub init_timeout: u64,
    /// Interval in seconds between reinit sweeps
    pub reinit_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 9000)
    /// - `STORE_PREFIX` - Backing store key prefix (default: /apisix)
    /// - `INIT_TIMEOUT` - Initial list timeout in seconds (default: 5)
    /// - `REINIT_INTERVAL` - Reinit sweep frequency in seconds (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.server_port),
            store_prefix: env::var("STORE_PREFIX")
                .ok()
                .map(|v| v.trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.store_prefix),
            init_timeout: env::var("INIT_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.init_timeout),
            reinit_interval: env::var("REINIT_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reinit_interval),
        }
    }

    /// Initial list timeout as a Duration.
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 9000,
            store_prefix: "/apisix".to_string(),
            init_timeout: 5,
            reinit_interval: 10,
        }
    }
}
