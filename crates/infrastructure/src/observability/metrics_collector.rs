//! Metrics collector for the delivery pipeline
//!
//! Records terminal outcomes and pipeline signals through the `metrics`
//! facade and mirrors them as structured `tracing` events. Without an
//! installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::{debug, info, warn};

use courier_domain::{Outcome, OutcomeEvent, OutcomeSink};

pub struct MetricsCollector {
    // Terminal outcomes
    items_acked_total: Counter,
    items_dead_lettered_total: Counter,
    items_undelivered_total: Counter,
    items_cancelled_total: Counter,

    // Pipeline signals
    retries_total: Counter,
    circuit_rejections_total: Counter,
    queue_depth: Gauge,

    delivery_latency: Histogram,
    delivery_attempts: Histogram,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            items_acked_total: counter!("courier_items_acked_total"),
            items_dead_lettered_total: counter!("courier_items_dead_lettered_total"),
            items_undelivered_total: counter!("courier_items_undelivered_total"),
            items_cancelled_total: counter!("courier_items_cancelled_total"),
            retries_total: counter!("courier_retries_total"),
            circuit_rejections_total: counter!("courier_circuit_rejections_total"),
            queue_depth: gauge!("courier_queue_depth"),
            delivery_latency: histogram!("courier_delivery_latency_seconds"),
            delivery_attempts: histogram!("courier_delivery_attempts"),
        }
    }
}

impl OutcomeSink for MetricsCollector {
    fn record(&self, event: &OutcomeEvent) {
        let latency_seconds = event.latency.as_secs_f64();

        match event.outcome {
            Outcome::Acked => {
                self.items_acked_total.increment(1);
                self.delivery_latency.record(latency_seconds);
                self.delivery_attempts.record(event.attempts as f64);
                info!(
                    sequence_id = event.sequence_id,
                    attempts = event.attempts,
                    latency_seconds,
                    "Item acknowledged"
                );
            }
            Outcome::DeadLettered => {
                self.items_dead_lettered_total.increment(1);
                self.delivery_attempts.record(event.attempts as f64);
                warn!(
                    sequence_id = event.sequence_id,
                    attempts = event.attempts,
                    "Item dead-lettered"
                );
            }
            Outcome::Undelivered => {
                self.items_undelivered_total.increment(1);
                warn!(
                    sequence_id = event.sequence_id,
                    attempts = event.attempts,
                    "Item undelivered at shutdown deadline"
                );
            }
            Outcome::Cancelled => {
                self.items_cancelled_total.increment(1);
                info!(sequence_id = event.sequence_id, "Item cancelled");
            }
        }
    }

    fn record_retry(&self, sequence_id: u64, attempt: u32) {
        self.retries_total.increment(1);
        debug!(sequence_id, attempt, "Retry scheduled");
    }

    fn record_circuit_rejection(&self, target: &str) {
        self.circuit_rejections_total.increment(1);
        debug!(downstream = target, "Send rejected by open circuit");
    }

    fn record_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metrics_collector_accepts_all_outcomes() {
        let collector = MetricsCollector::new();

        for (seq, outcome) in [
            Outcome::Acked,
            Outcome::DeadLettered,
            Outcome::Undelivered,
            Outcome::Cancelled,
        ]
        .into_iter()
        .enumerate()
        {
            collector.record(&OutcomeEvent {
                sequence_id: seq as u64 + 1,
                outcome,
                attempts: 1,
                latency: Duration::from_millis(5),
            });
        }

        collector.record_retry(1, 2);
        collector.record_circuit_rejection("default");
        collector.record_queue_depth(3);
    }
}
