use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ingest_api::{BatchId, BatchSender, DeadLetterSink, Record};

use crate::buffer::IngestBuffer;
use crate::config::EngineConfig;
use crate::dispatch::{spawn_dispatcher, spawn_flush_timer, DispatchSummary};
use crate::retry::RetryCoordinator;
use crate::stats::{IngestStats, StatsSnapshot};
use crate::EngineError;

/// Buffer + dispatcher + flush timer wired together.
pub struct IngestPipeline {
    buffer: Arc<IngestBuffer>,
    dead_letter: Arc<dyn DeadLetterSink>,
    stats: Arc<IngestStats>,
    /// Cuts backoff sleeps short (in-flight batch → `cancelled`).
    token: CancellationToken,
    timer_token: CancellationToken,
    dispatcher: JoinHandle<Result<DispatchSummary, EngineError>>,
    timer: Option<JoinHandle<()>>,
}

impl IngestPipeline {
    /// Spawn the background tasks. Must be called inside a tokio runtime.
    pub fn start(
        config: &EngineConfig,
        sender: Arc<dyn BatchSender>,
        dead_letter: Arc<dyn DeadLetterSink>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let stats = Arc::new(IngestStats::default());
        let (buffer, rx) = IngestBuffer::with_stats(
            config.buffer.capacity,
            config.buffer.max_pending_batches,
            stats.clone(),
        )?;
        let buffer = Arc::new(buffer);

        let coordinator = RetryCoordinator::new(sender, dead_letter.clone(), config.retry.backoff())
            .with_send_timeout(config.retry.send_timeout())
            .with_stats(stats.clone());

        let token = CancellationToken::new();
        let timer_token = token.child_token();

        let dispatcher = spawn_dispatcher(rx, Arc::new(coordinator), token.clone());
        let timer = config
            .buffer
            .flush_interval()
            .map(|interval| spawn_flush_timer(buffer.clone(), interval, timer_token.clone()));

        tracing::info!(
            capacity = config.buffer.capacity,
            flush_interval_ms = config.buffer.flush_interval_ms,
            max_retries = config.retry.max_retries,
            "ingest pipeline started"
        );

        Ok(Self {
            buffer,
            dead_letter,
            stats,
            token,
            timer_token,
            dispatcher,
            timer,
        })
    }

    pub async fn add(&self, record: Record) -> Result<Option<BatchId>, EngineError> {
        self.buffer.add(record).await
    }

    pub fn buffer(&self) -> &Arc<IngestBuffer> {
        &self.buffer
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Token cancelled on fatal dispatch errors; cancelling it aborts
    /// pending backoffs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Abort backoff sleeps: batches waiting for a retry are dead-lettered
    /// as `cancelled` instead of waiting out the delay.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stop the timer, flush and close the buffer, wait for the
    /// dispatcher to drain, flush the dead-letter sink.
    pub async fn shutdown(self) -> Result<StatsSnapshot, EngineError> {
        self.timer_token.cancel();
        if let Some(timer) = self.timer {
            let _ = timer.await;
        }

        let closed = self.buffer.close().await;
        let drained = self.dispatcher.await;

        if let Err(e) = self.dead_letter.flush().await {
            tracing::error!(error = %e, "dead-letter flush error");
        }

        // a dispatcher failure explains a failed close, report it first
        let summary = drained??;
        closed?;

        let stats = self.stats.snapshot();
        tracing::info!(
            batches = summary.batches,
            delivered = summary.delivered,
            partially_delivered = summary.partially_delivered,
            dead_lettered = summary.dead_lettered,
            records_added = stats.records_added,
            records_accepted = stats.records_accepted,
            records_dead_lettered = stats.records_dead_lettered,
            "ingest pipeline stopped"
        );
        Ok(stats)
    }
}
