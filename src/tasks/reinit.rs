//! Reinit Sweep Task
//!
//! Background task that periodically reinitializes stores whose watch broke.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::ReinitRegistry;

/// Spawns a background task that periodically drains the reinit registry.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps. A failed sweep leaves the failing store queued, so the
/// next sweep retries it.
///
/// # Arguments
/// * `registry` - Shared reinit registry the stores report to
/// * `interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let registry = Arc::new(ReinitRegistry::new());
/// let sweep_handle = spawn_reinit_task(registry.clone(), 10);
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_reinit_task(registry: Arc<ReinitRegistry>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting reinit sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            if registry.pending() == 0 {
                debug!("Reinit sweep: nothing to reinitialize");
                continue;
            }

            match registry.reinit().await {
                Ok(count) => info!("Reinit sweep: reinitialized {} store(s)", count),
                Err(err) => warn!("Reinit sweep failed, will retry: {}", err),
            }
        }
    })
}
