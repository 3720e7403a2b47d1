//! Store statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for store operations.
///
/// All counters are atomic and can be safely accessed from multiple threads.
#[derive(Debug, Default)]
pub struct StoreStats {
    upserts: AtomicU64,
    removals: AtomicU64,
    lookups: AtomicU64,
    replacements: AtomicU64,
}

impl StoreStats {
    /// Create new store statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an insert or update.
    #[inline]
    pub fn record_upsert(&self) {
        self.upserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a removal.
    #[inline]
    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a point lookup or full listing.
    #[inline]
    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a wholesale snapshot replacement.
    #[inline]
    pub fn record_replacement(&self) {
        self.replacements.fetch_add(1, Ordering::Relaxed);
    }

    /// Total inserts and updates.
    #[inline]
    pub fn upserts(&self) -> u64 {
        self.upserts.load(Ordering::Relaxed)
    }

    /// Total removals.
    #[inline]
    pub fn removals(&self) -> u64 {
        self.removals.load(Ordering::Relaxed)
    }

    /// Total lookups.
    #[inline]
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Total snapshot replacements.
    #[inline]
    pub fn replacements(&self) -> u64 {
        self.replacements.load(Ordering::Relaxed)
    }
}
