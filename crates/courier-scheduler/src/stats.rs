//! Dispatch counters: lock-free, shared by every loop.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct DispatchStats {
    enqueued: AtomicU64,
    canceled: AtomicU64,
    invalid: AtomicU64,
    sent: AtomicU64,
    rejected: AtomicU64,
    retried: AtomicU64,
    exhausted: AtomicU64,
    skipped_delivered: AtomicU64,
    ledger_errors: AtomicU64,
    sink_errors: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub canceled: u64,
    pub invalid: u64,
    pub sent: u64,
    pub rejected: u64,
    pub retried: u64,
    pub exhausted: u64,
    pub skipped_delivered: u64,
    pub ledger_errors: u64,
    pub sink_errors: u64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_enqueued(&self, n: u64) { bump(&self.enqueued, n) }
    pub fn add_canceled(&self, n: u64) { bump(&self.canceled, n) }
    pub fn add_invalid(&self, n: u64) { bump(&self.invalid, n) }
    pub fn record_sent(&self) { bump(&self.sent, 1) }
    pub fn record_rejected(&self) { bump(&self.rejected, 1) }
    pub fn record_retried(&self) { bump(&self.retried, 1) }
    pub fn record_exhausted(&self) { bump(&self.exhausted, 1) }
    /// A claimed job turned out to be in the ledger already.
    pub fn record_skipped_delivered(&self) { bump(&self.skipped_delivered, 1) }
    pub fn record_ledger_error(&self) { bump(&self.ledger_errors, 1) }
    pub fn record_sink_error(&self) { bump(&self.sink_errors, 1) }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            skipped_delivered: self.skipped_delivered.load(Ordering::Relaxed),
            ledger_errors: self.ledger_errors.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}
