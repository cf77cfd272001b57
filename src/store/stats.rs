//! Store Statistics Module
//!
//! Tracks reconciliation activity of a single store.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Store Stats ==
/// Counters updated by the loader and the watch task.
#[derive(Debug, Default)]
pub struct StoreStats {
    puts_applied: AtomicU64,
    deletes_applied: AtomicU64,
    decode_failures: AtomicU64,
    loads: AtomicU64,
    watch_failures: AtomicU64,
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatsSnapshot {
    /// Watch puts decoded and written to the cache
    pub puts_applied: u64,
    /// Watch deletes applied to the cache
    pub deletes_applied: u64,
    /// Watch puts skipped because they did not decode
    pub decode_failures: u64,
    /// Completed bulk loads, including reinitializations
    pub loads: u64,
    /// Watches that ended without the store being closed
    pub watch_failures: u64,
    /// Current number of cached objects
    pub total_entries: usize,
}

impl StoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_put(&self) {
        self.puts_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watch_failure(&self) {
        self.watch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the counters, tagging them with the current entry count.
    pub fn snapshot(&self, total_entries: usize) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            puts_applied: self.puts_applied.load(Ordering::Relaxed),
            deletes_applied: self.deletes_applied.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            watch_failures: self.watch_failures.load(Ordering::Relaxed),
            total_entries,
        }
    }
}
