use async_trait::async_trait;

use crate::entities::DeadLetter;
use crate::events::OutcomeEvent;

/// Receives items that exhausted their retries or failed permanently.
///
/// `accept` must not block the caller indefinitely; the dispatcher bounds each
/// call with a timeout regardless.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn accept(&self, dead_letter: DeadLetter);
}

/// Receives terminal-outcome events and pipeline signals for metrics/logging.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, event: &OutcomeEvent);

    fn record_retry(&self, _sequence_id: u64, _attempt: u32) {}

    fn record_circuit_rejection(&self, _target: &str) {}

    fn record_queue_depth(&self, _depth: usize) {}
}
