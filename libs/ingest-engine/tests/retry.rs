use std::time::Duration;

use common::{recs, RecordingDeadLetter, Reply, ScriptedSender};
use ingest_api::{Batch, BatchState, FailureReason, SinkError};
use ingest_engine::{BackoffPolicy, EngineError, RetryCoordinator};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

mod common;

fn policy(max_retries: u32) -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(250), max_retries)
}

#[tokio::test(start_paused = true)]
async fn transport_failure_exhausts_max_retries() {
    let sender = ScriptedSender::failing(SinkError::io("connection reset"));
    let dlq = RecordingDeadLetter::new();
    let coordinator = RetryCoordinator::new(sender.clone(), dlq.clone(), policy(3));

    let started = Instant::now();
    let outcome = coordinator
        .send(Batch::new(1, recs(0..4)), &CancellationToken::new())
        .await
        .unwrap();

    // 1 attempt + 3 retries, delays 100 + 200 + 250 (capped)
    assert_eq!(sender.call_count(), 4);
    assert_eq!(started.elapsed(), Duration::from_millis(550));
    assert_eq!(outcome.retries, 3);
    assert_eq!(outcome.accepted, 0);
    assert_eq!(outcome.state, BatchState::DeadLettered(FailureReason::TransportExhausted));

    let stored = dlq.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].reason, FailureReason::TransportExhausted);
    assert_eq!(stored[0].retry_count, 3);
    assert_eq!(stored[0].batch.records(), recs(0..4).as_slice());
    assert_eq!(stored[0].error, "connection reset");
    assert_eq!(coordinator.stats().snapshot().retries, 3);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers() {
    let sender = ScriptedSender::new(
        vec![Reply::Fail(SinkError::io("timeout")), Reply::Fail(SinkError::io("timeout"))],
        Reply::Accept,
    );
    let dlq = RecordingDeadLetter::new();
    let coordinator = RetryCoordinator::new(sender.clone(), dlq.clone(), policy(5));

    let outcome = coordinator
        .send(Batch::new(1, recs(0..3)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.state, BatchState::Delivered);
    assert_eq!(outcome.retries, 2);
    assert_eq!(outcome.accepted, 3);
    assert_eq!(sender.call_count(), 3);
    assert!(dlq.stored().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_records_dead_lettered_without_retry() {
    let sender = ScriptedSender::new(vec![Reply::Reject(vec![1, 3])], Reply::Accept);
    let dlq = RecordingDeadLetter::new();
    let coordinator = RetryCoordinator::new(sender.clone(), dlq.clone(), policy(5));

    let started = Instant::now();
    let outcome = coordinator
        .send(Batch::new(9, recs(0..5)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sender.call_count(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(outcome.accepted, 3);
    assert_eq!(outcome.rejected, 2);
    assert_eq!(outcome.retries, 0);
    assert_eq!(outcome.state, BatchState::PartiallyDelivered);

    let stored = dlq.stored();
    assert_eq!(stored.len(), 1);
    let failed = &stored[0];
    assert_eq!(failed.reason, FailureReason::Validation);
    assert_eq!(failed.retry_count, 0);
    assert_eq!(failed.batch.id(), 9);
    assert_eq!(failed.batch.records(), &[common::rec(1), common::rec(3)]);
    assert_eq!(failed.rejected.iter().map(|r| r.index).collect::<Vec<_>>(), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn everything_rejected_is_dead_lettered_state() {
    let sender = ScriptedSender::new(vec![Reply::Reject(vec![0, 1])], Reply::Accept);
    let dlq = RecordingDeadLetter::new();
    let coordinator = RetryCoordinator::new(sender, dlq.clone(), policy(5));

    let outcome = coordinator
        .send(Batch::new(1, recs(0..2)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.state, BatchState::DeadLettered(FailureReason::Validation));
    assert_eq!(dlq.stored()[0].batch.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn format_error_is_validation_failure() {
    let sender = ScriptedSender::failing(SinkError::format_err("schema mismatch"));
    let dlq = RecordingDeadLetter::new();
    let coordinator = RetryCoordinator::new(sender.clone(), dlq.clone(), policy(5));

    let outcome = coordinator
        .send(Batch::new(1, recs(0..3)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sender.call_count(), 1);
    assert_eq!(outcome.rejected, 3);
    assert_eq!(outcome.state, BatchState::DeadLettered(FailureReason::Validation));
    assert_eq!(dlq.stored()[0].batch.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn logic_error_is_not_retried() {
    let sender = ScriptedSender::failing(SinkError::logic("unexpected ack"));
    let dlq = RecordingDeadLetter::new();
    let coordinator = RetryCoordinator::new(sender.clone(), dlq.clone(), policy(5));

    let outcome = coordinator
        .send(Batch::new(1, recs(0..1)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sender.call_count(), 1);
    assert_eq!(outcome.state, BatchState::DeadLettered(FailureReason::NonRetryable));
    assert_eq!(dlq.stored()[0].reason, FailureReason::NonRetryable);
}

#[tokio::test(start_paused = true)]
async fn cancellation_cuts_backoff_short() {
    let sender = ScriptedSender::failing(SinkError::io("refused"));
    let dlq = RecordingDeadLetter::new();
    let coordinator = RetryCoordinator::new(
        sender.clone(),
        dlq.clone(),
        BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(600), 10),
    );
    let token = CancellationToken::new();

    let canceller = tokio::spawn({
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        }
    });

    let started = Instant::now();
    let outcome = coordinator.send(Batch::new(1, recs(0..2)), &token).await.unwrap();
    canceller.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(sender.call_count(), 1);
    assert_eq!(outcome.retries, 1);
    assert_eq!(outcome.state, BatchState::DeadLettered(FailureReason::Cancelled));

    let stored = dlq.stored();
    assert_eq!(stored[0].reason, FailureReason::Cancelled);
    assert_eq!(stored[0].batch.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_beats_zero_backoff() {
    for round in 0..50u64 {
        let sender = ScriptedSender::failing(SinkError::io("refused"));
        let dlq = RecordingDeadLetter::new();
        let coordinator = RetryCoordinator::new(
            sender.clone(),
            dlq.clone(),
            BackoffPolicy::new(Duration::ZERO, Duration::ZERO, 5),
        );
        let token = CancellationToken::new();
        token.cancel();

        let outcome = coordinator.send(Batch::new(round, recs(0..1)), &token).await.unwrap();

        assert_eq!(outcome.state, BatchState::DeadLettered(FailureReason::Cancelled), "round {round}");
        assert_eq!(sender.call_count(), 1);
        assert_eq!(dlq.stored()[0].reason, FailureReason::Cancelled);
    }
}

#[tokio::test(start_paused = true)]
async fn send_timeout_counts_as_transport_error() {
    let sender = ScriptedSender::new(vec![], Reply::Hang);
    let dlq = RecordingDeadLetter::new();
    let coordinator = RetryCoordinator::new(sender.clone(), dlq.clone(), policy(1))
        .with_send_timeout(Some(Duration::from_secs(2)));

    let outcome = coordinator
        .send(Batch::new(1, recs(0..1)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sender.call_count(), 2);
    assert_eq!(outcome.state, BatchState::DeadLettered(FailureReason::TransportExhausted));
    assert!(dlq.stored()[0].error.contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn dead_letter_failure_is_fatal() {
    let sender = ScriptedSender::new(vec![Reply::Reject(vec![0])], Reply::Accept);
    let coordinator = RetryCoordinator::new(sender, RecordingDeadLetter::broken(), policy(1));

    let err = coordinator
        .send(Batch::new(4, recs(0..2)), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        EngineError::DeadLetter { batch_id, source } => {
            assert_eq!(batch_id, 4);
            assert!(source.message().contains("no space left"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
