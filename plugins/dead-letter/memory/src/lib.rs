use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;

use ingest_api::{DeadLetterQuery, DeadLetterSink, FailedBatch, SinkError};

// ═══════════════════════════════════════════════════════════════
//  MemoryDeadLetterConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_batches() -> usize {
    10_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryDeadLetterConfig {
    #[serde(default = "default_max_batches")]
    pub max_batches: usize,
}

impl Default for MemoryDeadLetterConfig {
    fn default() -> Self {
        Self {
            max_batches: default_max_batches(),
        }
    }
}

impl MemoryDeadLetterConfig {
    /// Parse from a JSON object; `{}` or an empty string give the defaults.
    pub fn from_json(config_json: &str) -> Result<Self, SinkError> {
        let trimmed = config_json.trim();
        if trimmed.is_empty() || trimmed == "{}" {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_str(trimmed)?;
        if config.max_batches == 0 {
            return Err(SinkError::config("max_batches must be at least 1"));
        }
        Ok(config)
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryDeadLetterSink
// ═══════════════════════════════════════════════════════════════

/// In-memory ring of failed batches. Для тестов и запусков, где
/// dead letters не нужно переживать рестарт: при переполнении
/// вытесняется самый старый batch.
pub struct MemoryDeadLetterSink {
    batches: RwLock<VecDeque<FailedBatch>>,
    max_batches: usize,
}

impl MemoryDeadLetterSink {
    pub fn new(max_batches: usize) -> Self {
        let max_batches = max_batches.max(1);
        Self {
            batches: RwLock::new(VecDeque::with_capacity(max_batches.min(65536))),
            max_batches,
        }
    }

    pub fn from_config(config: &MemoryDeadLetterConfig) -> Arc<Self> {
        Arc::new(Self::new(config.max_batches))
    }

    pub fn max_batches(&self) -> usize {
        self.max_batches
    }

    pub async fn len(&self) -> usize {
        self.batches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.batches.read().await.is_empty()
    }
}

impl DeadLetterSink for MemoryDeadLetterSink {
    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn store(&self, failed: FailedBatch) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            let mut buf = self.batches.write().await;
            if buf.len() >= self.max_batches {
                if let Some(evicted) = buf.pop_front() {
                    tracing::warn!(
                        batch_id = evicted.batch.id(),
                        records = evicted.batch.len(),
                        reason = %evicted.reason,
                        "dead-letter ring full, evicting oldest batch"
                    );
                }
            }
            buf.push_back(failed);
            Ok(())
        })
    }

    fn query(
        &self,
        query: &DeadLetterQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<FailedBatch>, SinkError>> + Send + '_>> {
        let query = query.clone();
        Box::pin(async move {
            let buf = self.batches.read().await;
            let result = buf.iter().filter(|f| query.matches(f)).cloned().collect();
            Ok(query.apply_limit(result))
        })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        assert_eq!(MemoryDeadLetterConfig::from_json("{}").unwrap().max_batches, 10_000);
        assert_eq!(MemoryDeadLetterConfig::from_json("").unwrap().max_batches, 10_000);
        assert_eq!(MemoryDeadLetterConfig::from_json(r#"{"max_batches": 3}"#).unwrap().max_batches, 3);
    }

    #[test]
    fn config_rejects_zero() {
        let err = MemoryDeadLetterConfig::from_json(r#"{"max_batches": 0}"#).unwrap_err();
        assert_eq!(err.kind(), ingest_api::ErrorKind::Config);
    }
}
