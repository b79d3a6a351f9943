use std::future::Future;
use std::pin::Pin;

use crate::batch::{Batch, SendReport};
use crate::error::SinkError;

/// Boundary to the downstream ingestion service.
///
/// `Ok(report)` means the service answered: `report.accepted` records were
/// taken and `report.rejected` were refused as invalid. A transport
/// failure (connect, write, timeout) must be an `Err` of kind `Io` so the
/// coordinator retries it; `Format` means the whole batch is invalid.
pub trait BatchSender: Send + Sync {
    fn send_batch(&self, batch: &Batch) -> Pin<Box<dyn Future<Output = Result<SendReport, SinkError>> + Send + '_>>;
}
