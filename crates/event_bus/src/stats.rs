//! Dispatch statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the bus counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Calls to `publish`, including those that found no handlers
    pub events_published: u64,
    /// Publishes that took the quick-exit path (no bucket for the type)
    pub events_unhandled: u64,
    pub handlers_invoked: u64,
    pub handlers_deferred: u64,
    /// Handlers not run because the event was already cancelled
    pub handlers_skipped: u64,
    pub handler_failures: u64,
    pub handlers_registered: u64,
    pub handlers_unregistered: u64,
    /// Handlers currently registered across all buckets
    pub active_handlers: usize,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) published: AtomicU64,
    pub(crate) unhandled: AtomicU64,
    pub(crate) invoked: AtomicU64,
    pub(crate) deferred: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) failures: AtomicU64,
    pub(crate) registered: AtomicU64,
    pub(crate) unregistered: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, active_handlers: usize) -> BusStats {
        BusStats {
            events_published: self.published.load(Ordering::Relaxed),
            events_unhandled: self.unhandled.load(Ordering::Relaxed),
            handlers_invoked: self.invoked.load(Ordering::Relaxed),
            handlers_deferred: self.deferred.load(Ordering::Relaxed),
            handlers_skipped: self.skipped.load(Ordering::Relaxed),
            handler_failures: self.failures.load(Ordering::Relaxed),
            handlers_registered: self.registered.load(Ordering::Relaxed),
            handlers_unregistered: self.unregistered.load(Ordering::Relaxed),
            active_handlers,
        }
    }
}
