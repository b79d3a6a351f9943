use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::batch::{FailedBatch, FailureReason};
use crate::error::SinkError;

/// Durable destination for batches that could not be ingested.
///
/// `store` errors are fatal for the pipeline: an implementation must
/// surface storage exhaustion instead of dropping the batch.
pub trait DeadLetterSink: Send + Sync {
    /// Инициализация (создание директорий и т.д.)
    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Take ownership of a failed batch and persist it.
    fn store(&self, failed: FailedBatch) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Read stored batches back, oldest first.
    fn query(&self, query: &DeadLetterQuery) -> Pin<Box<dyn Future<Output = Result<Vec<FailedBatch>, SinkError>> + Send + '_>>;

    /// Flush буферов на диск.
    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;
}

/// Filter for `DeadLetterSink::query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeadLetterQuery {
    pub reason: Option<FailureReason>,
    /// Начало диапазона по `failed_at_ms` (inclusive).
    pub from_ms: Option<i64>,
    /// Конец диапазона (exclusive).
    pub to_ms: Option<i64>,
    /// При наличии возвращает последние N.
    pub limit: Option<usize>,
}

impl DeadLetterQuery {
    pub fn matches(&self, failed: &FailedBatch) -> bool {
        if let Some(reason) = self.reason {
            if failed.reason != reason {
                return false;
            }
        }
        if let Some(from) = self.from_ms {
            if failed.failed_at_ms < from {
                return false;
            }
        }
        if let Some(to) = self.to_ms {
            if failed.failed_at_ms >= to {
                return false;
            }
        }
        true
    }

    /// Keep the last `limit` entries.
    pub fn apply_limit(&self, mut result: Vec<FailedBatch>) -> Vec<FailedBatch> {
        if let Some(limit) = self.limit {
            if result.len() > limit {
                result = result.split_off(result.len() - limit);
            }
        }
        result
    }
}
