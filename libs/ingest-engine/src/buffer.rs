use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use ingest_api::{Batch, BatchId, Record};

use crate::stats::IngestStats;
use crate::EngineError;

// ═══════════════════════════════════════════════════════════════
//  BatchReceiver
// ═══════════════════════════════════════════════════════════════

/// Receiving end of the buffer → dispatcher channel. Yields batches in
/// flush order; `None` once the buffer is closed and drained.
pub struct BatchReceiver {
    rx: mpsc::Receiver<Batch>,
}

impl BatchReceiver {
    pub async fn recv(&mut self) -> Option<Batch> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Batch> {
        self.rx.try_recv().ok()
    }
}

// ═══════════════════════════════════════════════════════════════
//  IngestBuffer
// ═══════════════════════════════════════════════════════════════

struct BufferState {
    records: Vec<Record>,
    next_id: BatchId,
    /// `None` after `close()`.
    tx: Option<mpsc::Sender<Batch>>,
}

/// Bounded accumulation buffer shared by producer tasks.
///
/// One mutex guards the pending records, the batch counter and the
/// handoff sender. A flush first reserves a slot in the bounded channel,
/// then swaps the records out and sends them, all under the lock, so:
/// - a record is either in the pending list or in exactly one batch;
/// - batches reach the dispatcher in id order;
/// - only one flush runs at a time;
/// - dropping an `add`/`flush` future while it waits for a slot leaves
///   the records pending.
///
/// A full channel makes `add`/`flush` wait. This is the only way downstream
/// latency reaches producers.
pub struct IngestBuffer {
    state: Mutex<BufferState>,
    capacity: usize,
    stats: Arc<IngestStats>,
}

impl IngestBuffer {
    pub fn new(capacity: usize, max_pending_batches: usize) -> Result<(Self, BatchReceiver), EngineError> {
        Self::with_stats(capacity, max_pending_batches, Arc::default())
    }

    pub fn with_stats(
        capacity: usize,
        max_pending_batches: usize,
        stats: Arc<IngestStats>,
    ) -> Result<(Self, BatchReceiver), EngineError> {
        if capacity == 0 {
            return Err(EngineError::Config("buffer capacity must be at least 1".into()));
        }
        if max_pending_batches == 0 {
            return Err(EngineError::Config("max_pending_batches must be at least 1".into()));
        }

        let (tx, rx) = mpsc::channel(max_pending_batches);
        let buffer = Self {
            state: Mutex::new(BufferState {
                records: Vec::with_capacity(capacity.min(65536)),
                next_id: 1,
                tx: Some(tx),
            }),
            capacity,
            stats,
        };
        Ok((buffer, BatchReceiver { rx }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// Records waiting for the next flush.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Append a record. When the buffer reaches capacity it is flushed
    /// before returning; the id of that batch is returned.
    pub async fn add(&self, record: Record) -> Result<Option<BatchId>, EngineError> {
        let mut state = self.state.lock().await;
        if state.tx.is_none() {
            return Err(EngineError::Closed);
        }

        state.records.push(record);
        IngestStats::add(&self.stats.records_added, 1);

        if state.records.len() < self.capacity {
            return Ok(None);
        }

        let permit = reserve(&state).await?;
        let batch = self.take_batch(&mut state);
        let id = batch.id();
        permit.send(batch);
        Ok(Some(id))
    }

    /// Swap the pending records out as a new batch and hand it to the
    /// dispatcher. Returns the batch, or `None` if nothing was pending.
    pub async fn flush(&self) -> Result<Option<Batch>, EngineError> {
        let mut state = self.state.lock().await;
        if state.tx.is_none() {
            return Err(EngineError::Closed);
        }
        if state.records.is_empty() {
            return Ok(None);
        }

        let permit = reserve(&state).await?;
        let batch = self.take_batch(&mut state);
        permit.send(batch.clone());
        Ok(Some(batch))
    }

    /// Flush whatever is pending and stop accepting records. The
    /// dispatcher sees the end of the stream after the last batch.
    pub async fn close(&self) -> Result<Option<Batch>, EngineError> {
        let mut state = self.state.lock().await;
        if state.tx.is_none() {
            return Ok(None);
        }

        let last = if state.records.is_empty() {
            None
        } else {
            let permit = reserve(&state).await?;
            let batch = self.take_batch(&mut state);
            permit.send(batch.clone());
            Some(batch)
        };

        state.tx = None;
        tracing::debug!(last_batch = ?last.as_ref().map(Batch::id), "ingest buffer closed");
        Ok(last)
    }

    fn take_batch(&self, state: &mut BufferState) -> Batch {
        let records = std::mem::replace(&mut state.records, Vec::with_capacity(self.capacity.min(65536)));
        let id = state.next_id;
        state.next_id += 1;
        IngestStats::add(&self.stats.batches_flushed, 1);
        tracing::debug!(batch_id = id, records = records.len(), "flushed batch");
        Batch::new(id, records)
    }
}

/// Wait for a free slot in the dispatcher channel.
async fn reserve(state: &BufferState) -> Result<mpsc::OwnedPermit<Batch>, EngineError> {
    let Some(tx) = state.tx.clone() else {
        return Err(EngineError::Closed);
    };
    tx.reserve_owned().await.map_err(|_| {
        tracing::error!(
            batch_id = state.next_id,
            records = state.records.len(),
            "dispatcher gone, records stay in the buffer"
        );
        EngineError::DispatcherGone { batch_id: state.next_id, records: state.records.len() }
    })
}
