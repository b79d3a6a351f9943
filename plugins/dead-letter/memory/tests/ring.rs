use dead_letter_memory::MemoryDeadLetterSink;
use ingest_api::{Batch, DeadLetterQuery, DeadLetterSink, FailedBatch, FailureReason, Record};

fn failed(id: u64, reason: FailureReason, failed_at_ms: i64) -> FailedBatch {
    let batch = Batch::with_created_ms(id, failed_at_ms - 5, vec![Record::new().with("id", id as i64)]);
    let mut failed = FailedBatch::new(batch, reason, "boom", 2);
    failed.failed_at_ms = failed_at_ms;
    failed
}

#[tokio::test]
async fn stores_and_queries_in_order() {
    let sink = MemoryDeadLetterSink::new(10);
    sink.init().await.unwrap();

    sink.store(failed(1, FailureReason::Validation, 100)).await.unwrap();
    sink.store(failed(2, FailureReason::TransportExhausted, 200)).await.unwrap();
    sink.store(failed(3, FailureReason::Validation, 300)).await.unwrap();

    let all = sink.query(&DeadLetterQuery::default()).await.unwrap();
    assert_eq!(all.iter().map(|f| f.batch.id()).collect::<Vec<_>>(), vec![1, 2, 3]);

    let validation = sink
        .query(&DeadLetterQuery { reason: Some(FailureReason::Validation), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(validation.iter().map(|f| f.batch.id()).collect::<Vec<_>>(), vec![1, 3]);

    let window = sink
        .query(&DeadLetterQuery { from_ms: Some(200), to_ms: Some(300), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].batch.id(), 2);

    let last = sink
        .query(&DeadLetterQuery { limit: Some(2), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(last.iter().map(|f| f.batch.id()).collect::<Vec<_>>(), vec![2, 3]);
}

#[tokio::test]
async fn evicts_oldest_when_full() {
    let sink = MemoryDeadLetterSink::new(2);

    for id in 1..=4 {
        sink.store(failed(id, FailureReason::Cancelled, id as i64 * 10)).await.unwrap();
    }

    assert_eq!(sink.len().await, 2);
    let kept = sink.query(&DeadLetterQuery::default()).await.unwrap();
    assert_eq!(kept.iter().map(|f| f.batch.id()).collect::<Vec<_>>(), vec![3, 4]);
}

#[tokio::test]
async fn stored_batch_is_unchanged() {
    let sink = MemoryDeadLetterSink::new(4);
    let original = failed(7, FailureReason::NonRetryable, 70);

    sink.store(original.clone()).await.unwrap();
    sink.flush().await.unwrap();

    let back = sink.query(&DeadLetterQuery::default()).await.unwrap();
    assert_eq!(back, vec![original]);
}
