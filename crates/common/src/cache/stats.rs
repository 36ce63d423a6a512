//! Cache statistics and metrics tracking
//!
//! Counters are plain atomics updated with relaxed ordering; a snapshot is
//! therefore approximate under concurrent load but never blocks the cache.

use std::sync::atomic::{AtomicU64, Ordering};

use super::entry::EvictionReason;

/// Point-in-time statistics for a cache collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently stored, including stale ones not yet evicted
    pub size: usize,

    /// Reads that returned a value
    pub hits: u64,

    /// Reads that found nothing or found a stale entry
    pub misses: u64,

    /// New entries stored
    pub inserts: u64,

    /// Existing entries replaced by a write
    pub updates: u64,

    /// Entries evicted because a window was exceeded
    pub expirations: u64,

    /// Entries removed by `remove`, `clear` or dispose
    pub removals: u64,

    /// Sweep passes run, by the timer or forced
    pub sweeps: u64,
}

impl CacheStats {
    /// Calculate hit rate (hits / total accesses)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate miss rate (misses / total accesses)
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    /// Total number of read operations (hits + misses)
    pub const fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Total number of entries that left the cache for any reason
    pub const fn total_evictions(&self) -> u64 {
        self.expirations + self.removals
    }
}

/// Lock-free counters backing [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct MetricsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    expirations: AtomicU64,
    removals: AtomicU64,
    sweeps: AtomicU64,
}

impl MetricsCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_write(&self, replaced: bool) {
        if replaced {
            self.updates.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inserts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_eviction(&self, reason: EvictionReason) {
        if reason.is_expiry() {
            self.expirations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.removals.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, size: usize) -> CacheStats {
        CacheStats {
            size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }
}
