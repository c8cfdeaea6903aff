use std::sync::Arc;
use std::time::Duration;

use courier_config::CircuitState;
use courier_dispatcher::Dispatcher;
use courier_domain::{ErrorKind, Outcome, SendResponse};
use courier_testing_utils::builders::{self, payload};
use courier_testing_utils::{RecordingDeadLetterSink, RecordingOutcomeSink, ScriptedSender};

struct Harness {
    dispatcher: Dispatcher,
    dead_letters: RecordingDeadLetterSink,
    outcomes: RecordingOutcomeSink,
}

fn harness(sender: &ScriptedSender, max_attempts: u32) -> Harness {
    harness_with_sink(sender, max_attempts, RecordingDeadLetterSink::new())
}

fn harness_with_sink(
    sender: &ScriptedSender,
    max_attempts: u32,
    dead_letters: RecordingDeadLetterSink,
) -> Harness {
    let outcomes = RecordingOutcomeSink::new();
    let dispatcher = Dispatcher::builder(Arc::new(sender.clone()))
        .dispatcher_config(builders::dispatcher(1))
        .retry_config(builders::fast_retry(max_attempts))
        .circuit_breaker_config(builders::lenient_breaker())
        .dead_letter_sink(Arc::new(dead_letters.clone()))
        .outcome_sink(Arc::new(outcomes.clone()))
        .build()
        .unwrap();

    Harness {
        dispatcher,
        dead_letters,
        outcomes,
    }
}

#[tokio::test]
async fn test_permanent_failure_dead_letters_after_one_attempt() {
    let sender = ScriptedSender::always_permanent();
    let h = harness(&sender, 5);

    for i in 1..=3 {
        h.dispatcher.enqueue(payload(i)).await.unwrap();
    }
    h.dispatcher.start().await.unwrap();
    let report = h.dispatcher.stop(Duration::from_secs(5)).await;

    assert_eq!(report.stats.dead_lettered, 3);
    assert_eq!(sender.call_count(), 3);

    let dead_letters = h.dead_letters.dead_letters();
    assert_eq!(dead_letters.len(), 3);
    for dead_letter in &dead_letters {
        assert_eq!(dead_letter.total_attempts, 1);
        assert_eq!(dead_letter.final_error, ErrorKind::Permanent);
        assert!(dead_letter.reason.contains("HTTP 400"));
    }
    assert_eq!(h.outcomes.count(Outcome::DeadLettered), 3);
}

#[tokio::test]
async fn test_transient_failures_then_success_acks_with_attempt_count() {
    for k in 0..4u32 {
        let sender = ScriptedSender::fail_first(k);
        let h = harness(&sender, 5);

        h.dispatcher.enqueue(payload(1)).await.unwrap();
        h.dispatcher.start().await.unwrap();
        h.dispatcher.stop(Duration::from_secs(5)).await;

        let event = h.outcomes.event_for(1).unwrap();
        assert_eq!(event.outcome, Outcome::Acked, "k = {k}");
        assert_eq!(event.attempts, k + 1, "k = {k}");
        assert_eq!(h.dead_letters.count(), 0);
        assert_eq!(sender.attempts_for(&payload(1)), k + 1);
        assert_eq!(h.outcomes.retries().len(), k as usize);
    }
}

#[tokio::test]
async fn test_retry_budget_exhaustion_dead_letters() {
    let sender = ScriptedSender::always_transient();
    let h = harness(&sender, 3);

    h.dispatcher.enqueue(payload(1)).await.unwrap();
    h.dispatcher.start().await.unwrap();
    h.dispatcher.stop(Duration::from_secs(5)).await;

    let dead_letters = h.dead_letters.dead_letters();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].total_attempts, 3);
    assert_eq!(dead_letters[0].final_error, ErrorKind::Transient);
    assert_eq!(sender.call_count(), 3);
    assert_eq!(h.outcomes.retries(), vec![(1, 1), (1, 2)]);
}

#[tokio::test]
async fn test_single_attempt_budget_never_retries() {
    let sender = ScriptedSender::always_transient();
    let h = harness(&sender, 1);

    h.dispatcher.enqueue(payload(1)).await.unwrap();
    h.dispatcher.start().await.unwrap();
    h.dispatcher.stop(Duration::from_secs(5)).await;

    assert_eq!(sender.call_count(), 1);
    assert_eq!(h.dead_letters.dead_letters()[0].total_attempts, 1);
}

#[tokio::test]
async fn test_local_send_errors_only_affect_that_item() {
    let sender = ScriptedSender::new(|payload, _| {
        if payload == b"item-2" {
            Err(courier_errors::CourierError::Serialization(
                "invalid utf-8".to_string(),
            ))
        } else {
            Ok(courier_domain::SendResponse::ok())
        }
    });
    let h = harness(&sender, 5);

    for i in 1..=3 {
        h.dispatcher.enqueue(payload(i)).await.unwrap();
    }
    h.dispatcher.start().await.unwrap();
    let report = h.dispatcher.stop(Duration::from_secs(5)).await;

    assert_eq!(report.stats.acked, 2);
    assert_eq!(report.stats.dead_lettered, 1);
    assert_eq!(h.dead_letters.dead_letters()[0].sequence_id(), 2);
    assert_eq!(h.dead_letters.dead_letters()[0].total_attempts, 1);
}

#[tokio::test]
async fn test_slow_dead_letter_sink_does_not_block_worker() {
    let sender = ScriptedSender::always_permanent();
    let slow_sink = RecordingDeadLetterSink::new().with_delay(Duration::from_secs(10));
    let h = harness_with_sink(&sender, 5, slow_sink);

    for i in 1..=2 {
        h.dispatcher.enqueue(payload(i)).await.unwrap();
    }
    h.dispatcher.start().await.unwrap();

    let started = tokio::time::Instant::now();
    let report = h.dispatcher.stop(Duration::from_secs(5)).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.drained);
    assert_eq!(report.stats.dead_lettered, 2);
    assert_eq!(h.dead_letters.count(), 0);
}

#[tokio::test]
async fn test_permanent_failures_do_not_open_breaker() {
    let sender = ScriptedSender::always_permanent();
    let outcomes = RecordingOutcomeSink::new();
    let dispatcher = Dispatcher::builder(Arc::new(sender.clone()))
        .dispatcher_config(builders::dispatcher(1))
        .retry_config(builders::fast_retry(3))
        .circuit_breaker_config(builders::breaker(2, 0.5, Duration::from_secs(60)))
        .dead_letter_sink(Arc::new(RecordingDeadLetterSink::new()))
        .outcome_sink(Arc::new(outcomes.clone()))
        .build()
        .unwrap();

    for i in 1..=5 {
        dispatcher.enqueue(payload(i)).await.unwrap();
    }
    dispatcher.start().await.unwrap();
    dispatcher.stop(Duration::from_secs(5)).await;

    assert_eq!(dispatcher.circuit_breaker().state().await, CircuitState::Closed);
    assert_eq!(outcomes.circuit_rejections(), 0);
    assert_eq!(sender.call_count(), 5);
}

#[tokio::test]
async fn test_panicking_sender_dead_letters_item_and_worker_keeps_running() {
    let sender = ScriptedSender::new(|payload, _| {
        if builders::payload_index(payload) == Some(1) {
            panic!("downstream client bug");
        }
        Ok(SendResponse::ok())
    });
    let h = harness(&sender, 3);

    for i in 1..=3 {
        h.dispatcher.enqueue(payload(i)).await.unwrap();
    }
    h.dispatcher.start().await.unwrap();
    let report = h.dispatcher.stop(Duration::from_secs(2)).await;

    // 单个 worker 在 panic 之后继续处理后续条目
    assert!(report.drained);
    assert!(report.undelivered.is_empty());
    assert_eq!(report.stats.acked, 2);
    assert_eq!(sender.call_count(), 3);

    assert_eq!(h.outcomes.event_for(1).unwrap().outcome, Outcome::DeadLettered);
    assert_eq!(h.outcomes.event_for(2).unwrap().outcome, Outcome::Acked);
    assert_eq!(h.outcomes.event_for(3).unwrap().outcome, Outcome::Acked);

    let dead_letters = h.dead_letters.dead_letters();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].final_error, ErrorKind::Permanent);
    assert!(dead_letters[0].reason.contains("downstream client bug"));
}
