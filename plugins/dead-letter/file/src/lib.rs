mod config;
mod sink;

pub use config::{FileDeadLetterConfig, PartitionBy};
pub use sink::FileDeadLetterSink;
