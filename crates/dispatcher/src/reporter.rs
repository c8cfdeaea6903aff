use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use courier_domain::{Outcome, OutcomeEvent, OutcomeSink, WorkItem};

/// 终态计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub acked: u64,
    pub dead_lettered: u64,
    pub undelivered: u64,
    pub cancelled: u64,
}

impl DispatchStats {
    pub fn total(&self) -> u64 {
        self.acked + self.dead_lettered + self.undelivered + self.cancelled
    }
}

/// 把终态事件转发给 [`OutcomeSink`]，同时维护计数和未投递列表。
///
/// 每个条目只应被报告一次，由调用方保证。
pub struct OutcomeReporter {
    sink: Arc<dyn OutcomeSink>,
    acked: AtomicU64,
    dead_lettered: AtomicU64,
    cancelled: AtomicU64,
    undelivered: Mutex<Vec<u64>>,
}

impl OutcomeReporter {
    pub fn new(sink: Arc<dyn OutcomeSink>) -> Self {
        Self {
            sink,
            acked: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            undelivered: Mutex::new(Vec::new()),
        }
    }

    pub async fn report(&self, item: &WorkItem, outcome: Outcome) {
        match outcome {
            Outcome::Acked => {
                self.acked.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::DeadLettered => {
                self.dead_lettered.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Cancelled => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Undelivered => {
                self.undelivered.lock().await.push(item.sequence_id());
            }
        }

        self.sink.record(&OutcomeEvent {
            sequence_id: item.sequence_id(),
            outcome,
            attempts: item.attempts(),
            latency: item.age(),
        });
    }

    pub fn retry(&self, sequence_id: u64, attempt: u32) {
        self.sink.record_retry(sequence_id, attempt);
    }

    pub fn circuit_rejection(&self, target: &str) {
        self.sink.record_circuit_rejection(target);
    }

    pub fn queue_depth(&self, depth: usize) {
        self.sink.record_queue_depth(depth);
    }

    /// 已报告为未投递的序列号，按报告顺序
    pub async fn undelivered(&self) -> Vec<u64> {
        self.undelivered.lock().await.clone()
    }

    pub async fn stats(&self) -> DispatchStats {
        DispatchStats {
            acked: self.acked.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            undelivered: self.undelivered.lock().await.len() as u64,
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}
