#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use ingest_api::{
    Batch, BatchSender, DeadLetterQuery, DeadLetterSink, FailedBatch,
    Record, RejectedRecord, SendReport, SinkError,
};

pub fn rec(n: i64) -> Record {
    Record::new().with("n", n)
}

pub fn recs(range: std::ops::Range<i64>) -> Vec<Record> {
    range.map(rec).collect()
}

// ═══════════════════════════════════════════════════════════════
//  Scripted sender
// ═══════════════════════════════════════════════════════════════

#[derive(Clone)]
pub enum Reply {
    Accept,
    Reject(Vec<usize>),
    Fail(SinkError),
    /// Never answers.
    Hang,
}

/// Replays `script` one reply per call, then `fallback` forever.
pub struct ScriptedSender {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<Batch>>,
}

impl ScriptedSender {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn accepting() -> Arc<Self> {
        Self::new(Vec::new(), Reply::Accept)
    }

    pub fn failing(error: SinkError) -> Arc<Self> {
        Self::new(Vec::new(), Reply::Fail(error))
    }

    pub fn calls(&self) -> Vec<Batch> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl BatchSender for ScriptedSender {
    fn send_batch(&self, batch: &Batch) -> Pin<Box<dyn Future<Output = Result<SendReport, SinkError>> + Send + '_>> {
        self.calls.lock().unwrap().push(batch.clone());
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let len = batch.len();

        Box::pin(async move {
            match reply {
                Reply::Accept => Ok(SendReport::all_accepted(len)),
                Reply::Reject(indices) => Ok(SendReport {
                    accepted: len - indices.len(),
                    rejected: indices
                        .into_iter()
                        .map(|i| RejectedRecord::new(i, format!("record {i} invalid")))
                        .collect(),
                }),
                Reply::Fail(e) => Err(e),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Recording dead-letter sink
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct RecordingDeadLetter {
    stored: Mutex<Vec<FailedBatch>>,
    broken: bool,
}

impl RecordingDeadLetter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every `store` fails like a full disk.
    pub fn broken() -> Arc<Self> {
        Arc::new(Self { stored: Mutex::default(), broken: true })
    }

    pub fn stored(&self) -> Vec<FailedBatch> {
        self.stored.lock().unwrap().clone()
    }
}

impl DeadLetterSink for RecordingDeadLetter {
    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn store(&self, failed: FailedBatch) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            if self.broken {
                return Err(SinkError::io("no space left on device"));
            }
            self.stored.lock().unwrap().push(failed);
            Ok(())
        })
    }

    fn query(&self, query: &DeadLetterQuery) -> Pin<Box<dyn Future<Output = Result<Vec<FailedBatch>, SinkError>> + Send + '_>> {
        let query = query.clone();
        Box::pin(async move {
            let all = self.stored();
            Ok(query.apply_limit(all.into_iter().filter(|f| query.matches(f)).collect()))
        })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
