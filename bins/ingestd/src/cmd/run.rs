use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dead_letter_file::FileDeadLetterSink;
use dead_letter_memory::MemoryDeadLetterSink;
use ingest_api::{BatchSender, DeadLetterSink, Record};
use ingest_engine::IngestPipeline;
use sender_tcp::TcpSender;

use crate::config::{DeadLetterConfig, IngestdConfig, RunArgs, SenderConfig};
use crate::error::IngestdError;

/// Lines read from the input.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputCounts {
    pub lines: u64,
    pub records: u64,
    /// Not a JSON object; logged and skipped.
    pub invalid: u64,
}

pub async fn run(args: RunArgs) -> Result<(), IngestdError> {
    tracing::info!("ingestd starting");

    let config = IngestdConfig::effective(&args)?;
    tracing::info!(config = %args.config, "loaded config");

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(IngestdError::Input)?;
            tracing::info!(input = %path.display(), "reading records");
            Box::new(BufReader::new(file))
        }
        None => {
            tracing::info!("reading records from stdin");
            Box::new(BufReader::new(tokio::io::stdin()))
        }
    };

    let sender = build_sender(&config.sender);
    let dead_letter = build_dead_letter(&config.dead_letter);
    dead_letter.init().await?;

    let pipeline = IngestPipeline::start(&config.engine(), sender, dead_letter)?;

    // Ctrl+C cancels the pipeline while reading and while draining
    let interrupt = spawn_interrupt_watch(pipeline.cancellation_token(), async {
        tokio::signal::ctrl_c().await.map_err(IngestdError::Signal)
    });

    let mut counts = InputCounts::default();
    let fed = feed(&pipeline, input, &mut counts).await;

    tracing::info!(
        lines = counts.lines,
        records = counts.records,
        invalid = counts.invalid,
        "input finished, draining"
    );

    // a fatal pipeline error explains a failed feed, report it first
    let stats = pipeline.shutdown().await;
    interrupt.abort();
    if let Ok(Err(e)) = interrupt.await {
        tracing::error!(error = %e, "ctrl-c handler failed");
    }
    let stats = stats?;
    fed?;

    let line = serde_json::to_string(&stats)
        .map_err(|e| IngestdError::Output(std::io::Error::other(e)))?;
    println!("{line}");

    tracing::info!("shutdown complete");
    Ok(())
}

fn build_sender(config: &SenderConfig) -> Arc<dyn BatchSender> {
    match config {
        SenderConfig::Tcp(tcp) => {
            tracing::info!(addr = %tcp.addr(), "tcp sender");
            Arc::new(TcpSender::new(tcp))
        }
    }
}

fn build_dead_letter(config: &DeadLetterConfig) -> Arc<dyn DeadLetterSink> {
    match config {
        DeadLetterConfig::File(file) => {
            tracing::info!(
                data_dir = %file.data_dir.display(),
                partition_by = ?file.partition_by,
                "file dead-letter store"
            );
            Arc::new(FileDeadLetterSink::new(file))
        }
        DeadLetterConfig::Memory(memory) => {
            tracing::warn!(max_batches = memory.max_batches, "memory dead-letter store, lost on exit");
            MemoryDeadLetterSink::from_config(memory)
        }
    }
}

/// Cancel `token` once `signal` resolves. Runs until aborted, so Ctrl+C
/// after EOF still cuts the drain short.
fn spawn_interrupt_watch<F>(token: CancellationToken, signal: F) -> JoinHandle<Result<(), IngestdError>>
where
    F: Future<Output = Result<(), IngestdError>> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await?;
        tracing::warn!("interrupted, shutting down...");
        token.cancel();
        Ok(())
    })
}

/// Read NDJSON lines into the pipeline. Stops early, even on an idle
/// input, once the pipeline has been cancelled (Ctrl+C or a fatal error).
pub async fn feed<R>(pipeline: &IngestPipeline, reader: R, counts: &mut InputCounts) -> Result<(), IngestdError>
where
    R: AsyncBufRead + Unpin,
{
    let token = pipeline.cancellation_token();
    let mut lines = reader.lines();

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::warn!(line = counts.lines + 1, "pipeline cancelled, input not read to the end");
                break;
            }
            next = lines.next_line() => next.map_err(IngestdError::Input)?,
        };
        let Some(line) = next else { break };
        counts.lines += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record = match serde_json::from_str::<serde_json::Value>(line)
            .map_err(ingest_api::SinkError::from)
            .and_then(Record::from_json)
        {
            Ok(record) => record,
            Err(e) => {
                counts.invalid += 1;
                tracing::warn!(line = counts.lines, error = %e, "skipping invalid input line");
                continue;
            }
        };

        pipeline.add(record).await?;
        counts.records += 1;
    }
    Ok(())
}
