use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Атомарные счётчики pipeline: buffer → coordinator → dead-letter.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub records_added: AtomicU64,
    pub batches_flushed: AtomicU64,
    pub batches_delivered: AtomicU64,
    pub records_accepted: AtomicU64,
    pub records_rejected: AtomicU64,
    pub retries: AtomicU64,
    pub batches_dead_lettered: AtomicU64,
    pub records_dead_lettered: AtomicU64,
}

/// Point-in-time copy of `IngestStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub records_added: u64,
    pub batches_flushed: u64,
    pub batches_delivered: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
    pub retries: u64,
    pub batches_dead_lettered: u64,
    pub records_dead_lettered: u64,
}

impl IngestStats {
    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_added: self.records_added.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            batches_dead_lettered: self.batches_dead_lettered.load(Ordering::Relaxed),
            records_dead_lettered: self.records_dead_lettered.load(Ordering::Relaxed),
        }
    }
}
