use std::collections::BTreeMap;
use std::io::Write;

use dead_letter_file::FileDeadLetterSink;
use ingest_api::{DeadLetterQuery, DeadLetterSink, FailedBatch, FailureReason, SinkError};

use crate::config::{DeadLettersArgs, IngestdConfig};
use crate::error::IngestdError;

/// Batches and records per failure reason.
#[derive(Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReasonSummary {
    pub batches: u64,
    pub records: u64,
}

pub async fn run(args: DeadLettersArgs) -> Result<(), IngestdError> {
    let config = IngestdConfig::load(&args.config)?;
    let file = config.file_dead_letter(&args)?;
    let sink = FileDeadLetterSink::new(&file);

    let query = build_query(&args)?;
    tracing::debug!(data_dir = %file.data_dir.display(), ?query, "querying dead letters");
    let failed = sink.query(&query).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.summary {
        let line = serde_json::to_string(&summarize(&failed))
            .map_err(|e| IngestdError::Output(std::io::Error::other(e)))?;
        writeln!(out, "{line}").map_err(IngestdError::Output)?;
    } else {
        for batch in &failed {
            let line = serde_json::to_string(batch)
                .map_err(|e| IngestdError::Output(std::io::Error::other(e)))?;
            writeln!(out, "{line}").map_err(IngestdError::Output)?;
        }
    }
    out.flush().map_err(IngestdError::Output)?;

    tracing::info!(batches = failed.len(), "dead letters listed");
    Ok(())
}

fn build_query(args: &DeadLettersArgs) -> Result<DeadLetterQuery, IngestdError> {
    let reason = args
        .reason
        .as_deref()
        .map(str::parse::<FailureReason>)
        .transpose()
        .map_err(|e: SinkError| IngestdError::Config { context: "reason", detail: e.to_string() })?;

    if let (Some(from), Some(to)) = (args.from_ms, args.to_ms) {
        if to <= from {
            return Err(IngestdError::Config {
                context: "to_ms",
                detail: format!("--to-ms ({to}) must be after --from-ms ({from})"),
            });
        }
    }

    Ok(DeadLetterQuery {
        reason,
        from_ms: args.from_ms,
        to_ms: args.to_ms,
        limit: args.limit,
    })
}

fn summarize(failed: &[FailedBatch]) -> BTreeMap<String, ReasonSummary> {
    let mut summary: BTreeMap<String, ReasonSummary> = BTreeMap::new();
    for f in failed {
        let entry = summary.entry(f.reason.to_string()).or_default();
        entry.batches += 1;
        entry.records += f.batch.len() as u64;
    }
    summary
}
