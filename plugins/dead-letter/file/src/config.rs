use std::path::PathBuf;

use ingest_api::SinkError;

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

/// Стратегия партиционирования файлов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitionBy {
    /// Один файл на день падения: `{data_dir}/{YYYY-MM-DD}.jsonl`
    #[default]
    Date,
    /// Один файл на причину: `{data_dir}/{reason}.jsonl`
    Reason,
}

impl std::str::FromStr for PartitionBy {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(PartitionBy::Date),
            "reason" => Ok(PartitionBy::Reason),
            other => Err(SinkError::config(format!(
                "unknown partition_by '{other}', expected 'date' or 'reason'"
            ))),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("dead-letters")
}

fn default_fsync() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FileDeadLetterConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub partition_by: PartitionBy,
    /// `sync_data` after every stored batch.
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

impl Default for FileDeadLetterConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            partition_by: PartitionBy::default(),
            fsync: default_fsync(),
        }
    }
}

impl FileDeadLetterConfig {
    pub fn new(data_dir: impl Into<PathBuf>, partition_by: PartitionBy) -> Self {
        Self {
            data_dir: data_dir.into(),
            partition_by,
            fsync: default_fsync(),
        }
    }
}
