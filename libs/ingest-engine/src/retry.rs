use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ingest_api::{
    Batch, BatchId, BatchSender, BatchState, DeadLetterSink,
    FailedBatch, FailureReason, RejectedRecord, SendReport, SinkError,
};

use crate::backoff::BackoffPolicy;
use crate::stats::IngestStats;
use crate::EngineError;

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_id: BatchId,
    pub records: usize,
    pub accepted: usize,
    /// Records dead-lettered as invalid.
    pub rejected: usize,
    /// Transport retries performed (not counting the first attempt).
    pub retries: u32,
    pub state: BatchState,
}

// ═══════════════════════════════════════════════════════════════
//  RetryCoordinator
// ═══════════════════════════════════════════════════════════════

/// Wraps `BatchSender` with bounded exponential backoff and routes
/// everything that cannot be delivered to the `DeadLetterSink`.
///
/// - transport error (`ErrorKind::Io`, timeout) → retry, then
///   `TransportExhausted` after `max_retries` retries;
/// - records rejected in a report → dead-lettered as `Validation`, never
///   resent;
/// - `Format` error for the whole batch → `Validation`;
/// - `Config`/`Logic` error → `NonRetryable`;
/// - cancellation during a backoff sleep → `Cancelled`.
pub struct RetryCoordinator {
    sender: Arc<dyn BatchSender>,
    dead_letter: Arc<dyn DeadLetterSink>,
    backoff: BackoffPolicy,
    send_timeout: Option<Duration>,
    stats: Arc<IngestStats>,
}

impl RetryCoordinator {
    pub fn new(
        sender: Arc<dyn BatchSender>,
        dead_letter: Arc<dyn DeadLetterSink>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            sender,
            dead_letter,
            backoff,
            send_timeout: None,
            stats: Arc::default(),
        }
    }

    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_stats(mut self, stats: Arc<IngestStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// Deliver one batch. Only a failing dead-letter store is an `Err`.
    pub async fn send(&self, batch: Batch, token: &CancellationToken) -> Result<BatchOutcome, EngineError> {
        let mut retries: u32 = 0;

        loop {
            tracing::trace!(batch_id = batch.id(), state = ?BatchState::Sending, retries, "sending batch");

            let error = match self.attempt(&batch).await {
                Ok(report) => return self.settle(batch, report, retries).await,
                Err(e) => e,
            };

            if let Some(reason) = error.dead_letter_reason() {
                tracing::warn!(batch_id = batch.id(), error = %error, %reason, "batch refused");
                return self.give_up(batch, reason, error.to_string(), retries).await;
            }

            if retries >= self.backoff.max_retries {
                tracing::error!(
                    batch_id = batch.id(),
                    retries,
                    error = %error,
                    "transport retries exhausted"
                );
                return self
                    .give_up(batch, FailureReason::TransportExhausted, error.to_string(), retries)
                    .await;
            }

            let delay = self.backoff.delay(retries);
            retries += 1;
            IngestStats::add(&self.stats.retries, 1);
            tracing::warn!(
                batch_id = batch.id(),
                state = ?BatchState::Retrying { attempt: retries },
                max_retries = self.backoff.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transport error, backing off"
            );

            // cancellation wins over an elapsed (or zero) delay
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::warn!(batch_id = batch.id(), retries, "backoff cancelled");
                    let message = format!("cancelled while backing off after: {error}");
                    return self.give_up(batch, FailureReason::Cancelled, message, retries).await;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, batch: &Batch) -> Result<SendReport, SinkError> {
        match self.send_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.sender.send_batch(batch)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::io(format!("send timed out after {}ms", timeout.as_millis()))),
            },
            None => self.sender.send_batch(batch).await,
        }
    }

    /// The sender answered: dead-letter the rejected records, if any.
    async fn settle(&self, batch: Batch, report: SendReport, retries: u32) -> Result<BatchOutcome, EngineError> {
        let total = batch.len();
        let rejected = sanitize_rejected(batch.id(), total, report.rejected);

        if report.accepted + rejected.len() != total {
            tracing::warn!(
                batch_id = batch.id(),
                records = total,
                accepted = report.accepted,
                rejected = rejected.len(),
                "sender report does not add up to batch size"
            );
        }

        IngestStats::add(&self.stats.records_accepted, report.accepted);

        if rejected.is_empty() {
            IngestStats::add(&self.stats.batches_delivered, 1);
            tracing::debug!(batch_id = batch.id(), records = total, retries, "batch delivered");
            return Ok(BatchOutcome {
                batch_id: batch.id(),
                records: total,
                accepted: report.accepted,
                rejected: 0,
                retries,
                state: BatchState::Delivered,
            });
        }

        let rejected_count = rejected.len();
        IngestStats::add(&self.stats.records_rejected, rejected_count);

        let indices = rejected.iter().map(|r| r.index).collect::<Vec<_>>();
        let failed = FailedBatch::new(
            batch.subset(&indices),
            FailureReason::Validation,
            format!("{rejected_count} of {total} records rejected"),
            retries,
        )
        .with_rejected(rejected);
        self.dead_letter(failed).await?;

        let state = if report.accepted == 0 {
            BatchState::DeadLettered(FailureReason::Validation)
        } else {
            IngestStats::add(&self.stats.batches_delivered, 1);
            BatchState::PartiallyDelivered
        };

        Ok(BatchOutcome {
            batch_id: batch.id(),
            records: total,
            accepted: report.accepted,
            rejected: rejected_count,
            retries,
            state,
        })
    }

    /// Dead-letter the whole batch.
    async fn give_up(
        &self,
        batch: Batch,
        reason: FailureReason,
        error: String,
        retries: u32,
    ) -> Result<BatchOutcome, EngineError> {
        let batch_id = batch.id();
        let records = batch.len();
        let rejected = if reason == FailureReason::Validation { records } else { 0 };
        if rejected > 0 {
            IngestStats::add(&self.stats.records_rejected, rejected);
        }

        self.dead_letter(FailedBatch::new(batch, reason, error, retries)).await?;

        Ok(BatchOutcome {
            batch_id,
            records,
            accepted: 0,
            rejected,
            retries,
            state: BatchState::DeadLettered(reason),
        })
    }

    async fn dead_letter(&self, failed: FailedBatch) -> Result<(), EngineError> {
        let batch_id = failed.batch.id();
        let records = failed.batch.len();
        let reason = failed.reason;

        self.dead_letter
            .store(failed)
            .await
            .map_err(|source| EngineError::DeadLetter { batch_id, source })?;

        IngestStats::add(&self.stats.batches_dead_lettered, 1);
        IngestStats::add(&self.stats.records_dead_lettered, records);
        tracing::warn!(batch_id, records, %reason, "dead-lettered");
        Ok(())
    }
}

/// Drop out-of-range and duplicate indices; order by index.
fn sanitize_rejected(batch_id: BatchId, len: usize, mut rejected: Vec<RejectedRecord>) -> Vec<RejectedRecord> {
    let reported = rejected.len();
    rejected.retain(|r| r.index < len);
    rejected.sort_by_key(|r| r.index);
    rejected.dedup_by_key(|r| r.index);

    if rejected.len() != reported {
        tracing::warn!(
            batch_id,
            reported,
            kept = rejected.len(),
            "ignoring out-of-range or duplicate rejection indices"
        );
    }
    rejected
}
