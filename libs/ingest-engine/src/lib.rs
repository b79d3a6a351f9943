pub mod backoff;
pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod stats;

pub use backoff::BackoffPolicy;
pub use buffer::{BatchReceiver, IngestBuffer};
pub use config::{BufferConfig, EngineConfig, RetryConfig};
pub use dispatch::{spawn_dispatcher, spawn_flush_timer, DispatchSummary};
pub use error::EngineError;
pub use pipeline::IngestPipeline;
pub use retry::{BatchOutcome, RetryCoordinator};
pub use stats::{IngestStats, StatsSnapshot};
