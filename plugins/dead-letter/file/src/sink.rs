use std::future::Future;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use ingest_api::{date_from_ms, DeadLetterQuery, DeadLetterSink, FailedBatch, FailureReason, SinkError};

use crate::config::{FileDeadLetterConfig, PartitionBy};

// ════════════════════════════════════════════════════════════════
//  FileDeadLetterSink
// ════════════════════════════════════════════════════════════════

/// Append-only JSONL dead-letter store: one line per `FailedBatch`.
///
/// Filesystem work runs on the blocking pool. Appends are serialized by
/// `write_lock` so two batches never interleave within a line.
#[derive(Clone)]
pub struct FileDeadLetterSink {
    data_dir: PathBuf,
    partition_by: PartitionBy,
    fsync: bool,
    write_lock: Arc<Mutex<()>>,
}

impl FileDeadLetterSink {
    pub fn new(config: &FileDeadLetterConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            partition_by: config.partition_by,
            fsync: config.fsync,
            write_lock: Arc::default(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn partition_by(&self) -> PartitionBy {
        self.partition_by
    }

    /// Файл, в который попадает batch.
    fn batch_path(&self, failed: &FailedBatch) -> PathBuf {
        match self.partition_by {
            PartitionBy::Date => self.data_dir.join(format!("{}.jsonl", date_from_ms(failed.failed_at_ms))),
            PartitionBy::Reason => self.data_dir.join(format!("{}.jsonl", failed.reason)),
        }
    }

    // ── Store ──

    fn do_store(&self, failed: &FailedBatch) -> Result<(), SinkError> {
        let line = serde_json::to_string(failed)
            .map_err(|e| SinkError::format_err(format!("json serialize: {e}")))?;
        let path = self.batch_path(failed);

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| SinkError::logic("dead-letter write lock poisoned"))?;

        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| SinkError::io(format!("mkdir {}: {e}", self.data_dir.display())))?;

        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::io(format!("open {}: {e}", path.display())))?;
        writeln!(f, "{line}").map_err(|e| SinkError::io(format!("write {}: {e}", path.display())))?;
        if self.fsync {
            f.sync_data()
                .map_err(|e| SinkError::io(format!("fsync {}: {e}", path.display())))?;
        }

        tracing::debug!(
            batch_id = failed.batch.id(),
            reason = %failed.reason,
            path = %path.display(),
            "dead letter written"
        );
        Ok(())
    }

    // ── Query ──

    fn do_query(&self, query: &DeadLetterQuery) -> Result<Vec<FailedBatch>, SinkError> {
        let paths = self.resolve_query_files(query)?;

        let mut result = Vec::new();
        for path in &paths {
            let f = match std::fs::File::open(path) {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(SinkError::io(format!("open {}: {e}", path.display()))),
            };
            let reader = std::io::BufReader::new(f);

            for (n, line) in reader.lines().enumerate() {
                let line = line.map_err(|e| SinkError::io(format!("read {}: {e}", path.display())))?;
                if line.trim().is_empty() {
                    continue;
                }

                let failed: FailedBatch = serde_json::from_str(&line).map_err(|e| {
                    SinkError::format_err(format!("{}:{}: {e}", path.display(), n + 1))
                })?;
                if query.matches(&failed) {
                    result.push(failed);
                }
            }
        }

        if paths.len() > 1 {
            result.sort_by_key(|f| f.failed_at_ms);
        }

        Ok(query.apply_limit(result))
    }

    /// Определить список файлов для чтения.
    fn resolve_query_files(&self, query: &DeadLetterQuery) -> Result<Vec<PathBuf>, SinkError> {
        match self.partition_by {
            PartitionBy::Reason => {
                let reasons = match query.reason {
                    Some(reason) => vec![reason],
                    None => FailureReason::ALL.to_vec(),
                };
                Ok(reasons
                    .into_iter()
                    .map(|r| self.data_dir.join(format!("{r}.jsonl")))
                    .filter(|p| p.exists())
                    .collect())
            }
            PartitionBy::Date => self.date_files(query.from_ms, query.to_ms),
        }
    }

    fn date_files(&self, from_ms: Option<i64>, to_ms: Option<i64>) -> Result<Vec<PathBuf>, SinkError> {
        let dir = match std::fs::read_dir(&self.data_dir) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SinkError::io(format!("read dir {}: {e}", self.data_dir.display()))),
        };

        let from_date = from_ms.map(date_from_ms);
        let to_date = to_ms.map(date_from_ms);

        let mut files = Vec::new();
        for entry in dir {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(date) = name.strip_suffix(".jsonl") else {
                continue;
            };
            if let Some(ref from) = from_date {
                if date < from.as_str() {
                    continue;
                }
            }
            if let Some(ref to) = to_date {
                if date > to.as_str() {
                    continue;
                }
            }
            files.push(entry.path());
        }
        files.sort();
        Ok(files)
    }
}

// ════════════════════════════════════════════════════════════════
//  DeadLetterSink impl
// ════════════════════════════════════════════════════════════════

impl DeadLetterSink for FileDeadLetterSink {
    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        let dir = self.data_dir.clone();
        Box::pin(blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| SinkError::io(format!("mkdir {}: {e}", dir.display())))
        }))
    }

    fn store(&self, failed: FailedBatch) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        let this = self.clone();
        Box::pin(blocking(move || this.do_store(&failed)))
    }

    fn query(
        &self,
        query: &DeadLetterQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<FailedBatch>, SinkError>> + Send + '_>> {
        let this = self.clone();
        let query = query.clone();
        Box::pin(blocking(move || this.do_query(&query)))
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        // every store is written through
        Box::pin(async { Ok(()) })
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

async fn blocking<T, F>(f: F) -> Result<T, SinkError>
where
    F: FnOnce() -> Result<T, SinkError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SinkError::logic(format!("dead-letter task failed: {e}")))?
}
