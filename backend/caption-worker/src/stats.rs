//! Dispatch counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time view of the dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub received: u64,
    pub decode_failures: u64,
    /// Records that already carried a caption
    pub skipped_captioned: u64,
    /// Records dropped because the same photo was already being enriched
    pub skipped_in_flight: u64,
    /// Records republished with the caption already in the store
    pub from_store: u64,
    pub enriched: u64,
    /// Enriched or republished from the store, but the store write or publish failed
    pub partial: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

/// Thread-safe counters shared with the enrichment tasks
#[derive(Clone, Default)]
pub struct StatsCollector {
    inner: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    decode_failures: AtomicU64,
    skipped_captioned: AtomicU64,
    skipped_in_flight: AtomicU64,
    from_store: AtomicU64,
    enriched: AtomicU64,
    partial: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.inner.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_captioned(&self) {
        self.inner.skipped_captioned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_in_flight(&self) {
        self.inner.skipped_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stored caption that was republished; `complete` is false when the publish failed
    pub fn record_from_store(&self, complete: bool) {
        self.inner.from_store.fetch_add(1, Ordering::Relaxed);
        if !complete {
            self.inner.partial.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a produced caption; `complete` is false when persist or publish failed
    pub fn record_enriched(&self, complete: bool) {
        self.inner.enriched.fetch_add(1, Ordering::Relaxed);
        if !complete {
            self.inner.partial.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failed(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.inner.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStats {
        let c = &self.inner;
        DispatchStats {
            received: c.received.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            skipped_captioned: c.skipped_captioned.load(Ordering::Relaxed),
            skipped_in_flight: c.skipped_in_flight.load(Ordering::Relaxed),
            from_store: c.from_store.load(Ordering::Relaxed),
            enriched: c.enriched.load(Ordering::Relaxed),
            partial: c.partial.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dead_lettered: c.dead_lettered.load(Ordering::Relaxed),
        }
    }
}
