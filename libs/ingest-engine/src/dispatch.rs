use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use ingest_api::BatchState;

use crate::buffer::{BatchReceiver, IngestBuffer};
use crate::retry::RetryCoordinator;
use crate::EngineError;

/// Totals reported by a dispatcher that drained cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub batches: u64,
    pub delivered: u64,
    pub partially_delivered: u64,
    pub dead_lettered: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Dispatcher task: BatchReceiver → RetryCoordinator
// ═══════════════════════════════════════════════════════════════

/// Запустить dispatcher: получает батчи из буфера в порядке flush и
/// передаёт их в RetryCoordinator, по одному.
///
/// Runs until the buffer is closed and every batch is handled. The token
/// only cuts backoff sleeps short; it does not abandon queued batches.
/// A dead-letter failure stops the task, cancels the token and comes back
/// as the task's error.
pub fn spawn_dispatcher(
    mut rx: BatchReceiver,
    coordinator: Arc<RetryCoordinator>,
    token: CancellationToken,
) -> JoinHandle<Result<DispatchSummary, EngineError>> {
    tokio::spawn(async move {
        let mut summary = DispatchSummary::default();

        while let Some(batch) = rx.recv().await {
            let batch_id = batch.id();
            tracing::trace!(batch_id, state = ?BatchState::Pending, "dispatching");

            match coordinator.send(batch, &token).await {
                Ok(outcome) => {
                    summary.batches += 1;
                    match outcome.state {
                        BatchState::Delivered => summary.delivered += 1,
                        BatchState::PartiallyDelivered => summary.partially_delivered += 1,
                        BatchState::DeadLettered(_) => summary.dead_lettered += 1,
                        _ => {}
                    }
                    tracing::debug!(
                        batch_id,
                        accepted = outcome.accepted,
                        rejected = outcome.rejected,
                        retries = outcome.retries,
                        state = ?outcome.state,
                        "batch settled"
                    );
                }
                Err(e) => {
                    tracing::error!(batch_id, error = %e, "fatal dispatch error, stopping");
                    token.cancel();
                    return Err(e);
                }
            }
        }

        tracing::info!(
            batches = summary.batches,
            dead_lettered = summary.dead_lettered,
            "dispatcher drained"
        );
        Ok(summary)
    })
}

// ═══════════════════════════════════════════════════════════════
//  Flush timer
// ═══════════════════════════════════════════════════════════════

/// Flush the buffer every `interval` while it has pending records.
/// Stops on cancellation or once the buffer is closed.
pub fn spawn_flush_timer(
    buffer: Arc<IngestBuffer>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match buffer.flush().await {
                        Ok(Some(batch)) => {
                            tracing::debug!(batch_id = batch.id(), records = batch.len(), "timer flush");
                        }
                        Ok(None) => {}
                        Err(EngineError::Closed) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "timer flush failed, stopping");
                            break;
                        }
                    }
                }
                _ = token.cancelled() => break,
            }
        }
        tracing::debug!("flush timer stopped");
    })
}
