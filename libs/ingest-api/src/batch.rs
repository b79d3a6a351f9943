use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::record::Record;
use crate::time::now_ms;

/// Sequence number of a batch within one buffer, starting at 1.
pub type BatchId = u64;

// ════════════════════════════════════════════════════════════════
//  Batch
// ════════════════════════════════════════════════════════════════

/// Ordered, immutable group of records created at flush time.
///
/// Records live behind an `Arc<[Record]>`: cloning a batch to hand it to
/// the dispatcher and to the caller shares the same slice and there is
/// no API to mutate it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    created_ms: i64,
    records: Arc<[Record]>,
}

impl Batch {
    pub fn new(id: BatchId, records: Vec<Record>) -> Self {
        Self::with_created_ms(id, now_ms(), records)
    }

    pub fn with_created_ms(id: BatchId, created_ms: i64, records: Vec<Record>) -> Self {
        Self {
            id,
            created_ms,
            records: records.into(),
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn created_ms(&self) -> i64 {
        self.created_ms
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// New batch with the same id and creation time holding only the
    /// records at `indices`, in the order given.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let records = indices
            .iter()
            .filter_map(|&i| self.records.get(i).cloned())
            .collect::<Vec<_>>();
        Self::with_created_ms(self.id, self.created_ms, records)
    }
}

// ════════════════════════════════════════════════════════════════
//  Send report
// ════════════════════════════════════════════════════════════════

/// One record refused by the downstream service as invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Position in the batch that was sent.
    pub index: usize,
    pub reason: String,
}

impl RejectedRecord {
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self { index, reason: reason.into() }
    }
}

/// Result of a successful `send_batch` call. A transport failure is an
/// `Err` instead, never a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
    pub accepted: usize,
    #[serde(default)]
    pub rejected: Vec<RejectedRecord>,
}

impl SendReport {
    pub fn all_accepted(count: usize) -> Self {
        Self { accepted: count, rejected: Vec::new() }
    }

    pub fn is_partial(&self) -> bool {
        !self.rejected.is_empty()
    }
}

// ════════════════════════════════════════════════════════════════
//  Failure bookkeeping
// ════════════════════════════════════════════════════════════════

/// Why a batch (or part of it) ended up in the dead-letter sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Records rejected as invalid. Never retried.
    Validation,
    /// Transport kept failing until `max_retries` was used up.
    TransportExhausted,
    /// Sender failed with a config/logic error.
    NonRetryable,
    /// Shutdown interrupted a backoff before the batch was delivered.
    Cancelled,
}

impl FailureReason {
    pub const ALL: [FailureReason; 4] = [
        FailureReason::Validation,
        FailureReason::TransportExhausted,
        FailureReason::NonRetryable,
        FailureReason::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Validation => "validation",
            FailureReason::TransportExhausted => "transport_exhausted",
            FailureReason::NonRetryable => "non_retryable",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureReason {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureReason::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| SinkError::config(format!("unknown failure reason '{s}'")))
    }
}

/// A batch handed over to the dead-letter sink, which owns it from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedBatch {
    /// For `Validation` only the rejected records; otherwise the whole batch.
    pub batch: Batch,
    pub reason: FailureReason,
    /// Last error message seen.
    pub error: String,
    pub failed_at_ms: i64,
    pub retry_count: u32,
    /// `rejected[i]` describes `batch.records()[i]`; `index` still points
    /// into the batch as it was sent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedRecord>,
}

impl FailedBatch {
    pub fn new(batch: Batch, reason: FailureReason, error: impl Into<String>, retry_count: u32) -> Self {
        Self {
            batch,
            reason,
            error: error.into(),
            failed_at_ms: now_ms(),
            retry_count,
            rejected: Vec::new(),
        }
    }

    pub fn with_rejected(mut self, rejected: Vec<RejectedRecord>) -> Self {
        self.rejected = rejected;
        self
    }
}

// ════════════════════════════════════════════════════════════════
//  Batch state
// ════════════════════════════════════════════════════════════════

/// Lifecycle of a batch inside the retry coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Flushed, waiting for the dispatcher.
    Pending,
    Sending,
    /// Backing off before retry number `attempt` (1-based).
    Retrying { attempt: u32 },
    /// Every record accepted.
    Delivered,
    /// Some records accepted, the rejected ones dead-lettered.
    PartiallyDelivered,
    DeadLettered(FailureReason),
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Delivered | BatchState::PartiallyDelivered | BatchState::DeadLettered(_)
        )
    }
}
