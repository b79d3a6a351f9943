pub mod batch;
pub mod dead_letter;
pub mod error;
pub mod record;
pub mod sender;
pub mod time;

pub use batch::{Batch, BatchId, BatchState, FailedBatch, FailureReason, RejectedRecord, SendReport};
pub use dead_letter::{DeadLetterQuery, DeadLetterSink};
pub use error::{ErrorKind, SinkError};
pub use record::{Record, Value};
pub use sender::BatchSender;
pub use time::{date_from_ms, now_ms};
