//! Page cache counters charged by record reads during a check.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::Serialize;

/// Snapshot of page cache activity during a check.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageCacheStats {
    /// Pages pinned for a record read.
    pub pins: u64,
    /// Pages released after a record read.
    pub unpins: u64,
    /// Reads served without faulting.
    pub hits: u64,
    /// Reads that failed or had to fault the page in.
    pub faults: u64,
}

/// Thread-safe page cache counters shared by all workers of a check.
#[derive(Default, Debug)]
pub struct PageCacheTracer {
    pins: AtomicU64,
    unpins: AtomicU64,
    hits: AtomicU64,
    faults: AtomicU64,
}

impl PageCacheTracer {
    /// Creates a tracer with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a pin.
    pub fn record_pin(&self) {
        self.pins.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Counts an unpin.
    pub fn record_unpin(&self) {
        self.unpins.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Counts a hit.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Counts a fault.
    pub fn record_fault(&self) {
        self.faults.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Captures the current counters.
    pub fn snapshot(&self) -> PageCacheStats {
        PageCacheStats {
            pins: self.pins.load(AtomicOrdering::Relaxed),
            unpins: self.unpins.load(AtomicOrdering::Relaxed),
            hits: self.hits.load(AtomicOrdering::Relaxed),
            faults: self.faults.load(AtomicOrdering::Relaxed),
        }
    }

    /// Emits the current counters at info level.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "sombra_check::page_cache",
            pins = snapshot.pins,
            unpins = snapshot.unpins,
            hits = snapshot.hits,
            faults = snapshot.faults,
            "page cache stats snapshot"
        );
    }
}
