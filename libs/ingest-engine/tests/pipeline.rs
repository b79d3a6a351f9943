use std::time::Duration;

use common::{recs, RecordingDeadLetter, Reply, ScriptedSender};
use ingest_api::{FailureReason, SinkError};
use ingest_engine::{BufferConfig, EngineConfig, EngineError, IngestPipeline, RetryConfig};

mod common;

fn config(capacity: usize, flush_interval_ms: u64) -> EngineConfig {
    EngineConfig {
        buffer: BufferConfig {
            capacity,
            flush_interval_ms,
            max_pending_batches: 2,
        },
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 10,
            max_delay_ms: 100,
            send_timeout_ms: 0,
        },
    }
}

#[tokio::test(start_paused = true)]
async fn records_flow_through_and_drain_on_shutdown() {
    let sender = ScriptedSender::accepting();
    let dlq = RecordingDeadLetter::new();
    let pipeline = IngestPipeline::start(&config(3, 0), sender.clone(), dlq.clone()).unwrap();

    for r in recs(0..7) {
        pipeline.add(r).await.unwrap();
    }
    let stats = pipeline.shutdown().await.unwrap();

    let sizes = sender.calls().iter().map(|b| b.len()).collect::<Vec<_>>();
    assert_eq!(sizes, vec![3, 3, 1]);
    let delivered = sender.calls().iter().flat_map(|b| b.records().to_vec()).collect::<Vec<_>>();
    assert_eq!(delivered, recs(0..7));

    assert_eq!(stats.records_added, 7);
    assert_eq!(stats.batches_flushed, 3);
    assert_eq!(stats.batches_delivered, 3);
    assert_eq!(stats.records_accepted, 7);
    assert_eq!(stats.records_dead_lettered, 0);
    assert!(dlq.stored().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timer_flushes_partial_buffer() {
    let sender = ScriptedSender::accepting();
    let pipeline = IngestPipeline::start(&config(100, 1000), sender.clone(), RecordingDeadLetter::new()).unwrap();

    pipeline.add(common::rec(1)).await.unwrap();
    pipeline.add(common::rec(2)).await.unwrap();
    assert_eq!(sender.call_count(), 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    // let the dispatcher pick the batch up
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(sender.call_count(), 1);
    assert_eq!(sender.calls()[0].len(), 2);
    assert!(pipeline.buffer().is_empty().await);

    pipeline.shutdown().await.unwrap();
    assert_eq!(sender.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn mixed_outcomes_are_counted() {
    let sender = ScriptedSender::new(
        vec![
            Reply::Reject(vec![0]),
            Reply::Fail(SinkError::io("reset")),
            Reply::Fail(SinkError::io("reset")),
            Reply::Fail(SinkError::io("reset")),
        ],
        Reply::Accept,
    );
    let dlq = RecordingDeadLetter::new();
    let pipeline = IngestPipeline::start(&config(2, 0), sender.clone(), dlq.clone()).unwrap();

    for r in recs(0..6) {
        pipeline.add(r).await.unwrap();
    }
    let stats = pipeline.shutdown().await.unwrap();

    // batch 1: one record rejected; batch 2: 1 try + 2 retries, exhausted; batch 3: delivered
    let reasons = dlq.stored().iter().map(|f| f.reason).collect::<Vec<_>>();
    assert_eq!(reasons, vec![FailureReason::Validation, FailureReason::TransportExhausted]);
    assert_eq!(stats.records_accepted, 1 + 2);
    assert_eq!(stats.records_rejected, 1);
    assert_eq!(stats.records_dead_lettered, 1 + 2);
    assert_eq!(stats.retries, 2);
    assert_eq!(sender.call_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn cancel_dead_letters_batch_in_backoff() {
    let sender = ScriptedSender::failing(SinkError::io("refused"));
    let dlq = RecordingDeadLetter::new();
    let mut cfg = config(2, 0);
    cfg.retry.base_delay_ms = 60_000;
    cfg.retry.max_delay_ms = 60_000;
    let pipeline = IngestPipeline::start(&cfg, sender, dlq.clone()).unwrap();

    pipeline.add(common::rec(1)).await.unwrap();
    pipeline.add(common::rec(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    pipeline.cancel();
    let stats = pipeline.shutdown().await.unwrap();

    let stored = dlq.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].reason, FailureReason::Cancelled);
    assert_eq!(stats.records_dead_lettered, 2);
}

#[tokio::test(start_paused = true)]
async fn dead_letter_failure_surfaces_from_shutdown() {
    let sender = ScriptedSender::new(vec![Reply::Reject(vec![1])], Reply::Accept);
    let pipeline = IngestPipeline::start(&config(2, 0), sender, RecordingDeadLetter::broken()).unwrap();
    let token = pipeline.cancellation_token();

    pipeline.add(common::rec(1)).await.unwrap();
    pipeline.add(common::rec(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(token.is_cancelled());

    let err = pipeline.shutdown().await.unwrap_err();
    assert!(matches!(err, EngineError::DeadLetter { batch_id: 1, .. }));
}
