use ingest_api::{BatchId, SinkError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config: {0}")]
    Config(String),

    #[error("ingest buffer is closed")]
    Closed,

    /// Dead-letter storage failed. Fatal: the batch has nowhere left to go.
    #[error("dead-letter store (batch {batch_id}): {source}")]
    DeadLetter { batch_id: BatchId, source: SinkError },

    /// The dispatcher stopped; the records of the would-be batch stay buffered.
    #[error("dispatcher stopped, batch {batch_id} with {records} records not handed over")]
    DispatcherGone { batch_id: BatchId, records: usize },

    #[error("dispatcher task: {0}")]
    Join(#[from] tokio::task::JoinError),
}
