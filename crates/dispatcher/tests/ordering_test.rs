use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use courier_dispatcher::{Dispatcher, LifecycleState};
use courier_domain::Outcome;
use courier_testing_utils::builders::{self, payload};
use courier_testing_utils::{RecordingOutcomeSink, ScriptedSender};

fn single_worker(sender: &ScriptedSender, outcomes: &RecordingOutcomeSink) -> Dispatcher {
    Dispatcher::builder(Arc::new(sender.clone()))
        .dispatcher_config(builders::dispatcher(1))
        .retry_config(builders::fast_retry(3))
        .circuit_breaker_config(builders::lenient_breaker())
        .outcome_sink(Arc::new(outcomes.clone()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_single_worker_delivers_in_enqueue_order() {
    let sender = ScriptedSender::always_ok();
    let outcomes = RecordingOutcomeSink::new();
    let dispatcher = single_worker(&sender, &outcomes);

    let expected: Vec<Vec<u8>> = (1..=50).map(payload).collect();
    for p in &expected {
        dispatcher.enqueue(p.clone()).await.unwrap();
    }

    dispatcher.start().await.unwrap();
    let report = dispatcher.stop(Duration::from_secs(5)).await;

    assert!(report.drained);
    assert_eq!(report.stats.acked, 50);
    assert_eq!(sender.calls(), expected);

    let acked: Vec<u64> = outcomes
        .with_outcome(Outcome::Acked)
        .iter()
        .map(|e| e.sequence_id)
        .collect();
    assert_eq!(acked, (1..=50).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_sequence_ids_are_monotonic() {
    let sender = ScriptedSender::always_ok();
    let dispatcher = single_worker(&sender, &RecordingOutcomeSink::new());

    let mut previous = 0;
    for i in 1..=10 {
        let seq = dispatcher.enqueue(payload(i)).await.unwrap();
        assert!(seq > previous);
        previous = seq;
    }
    assert_eq!(dispatcher.queue_len().await, 10);
    assert_eq!(dispatcher.state(), LifecycleState::Created);

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_items_enqueued_while_running_keep_order() {
    let sender = ScriptedSender::always_ok().with_latency(Duration::from_millis(1));
    let outcomes = RecordingOutcomeSink::new();
    let dispatcher = single_worker(&sender, &outcomes);

    dispatcher.start().await.unwrap();
    for i in 1..=20 {
        dispatcher.enqueue(payload(i)).await.unwrap();
    }
    dispatcher.stop(Duration::from_secs(5)).await;

    let expected: Vec<Vec<u8>> = (1..=20).map(payload).collect();
    assert_eq!(sender.calls(), expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_single_worker_preserves_fifo(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..8), 1..40)
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let calls = rt.block_on(async {
            let sender = ScriptedSender::always_ok();
            let dispatcher = single_worker(&sender, &RecordingOutcomeSink::new());
            dispatcher.start().await.unwrap();
            for p in &payloads {
                dispatcher.enqueue(p.clone()).await.unwrap();
            }
            dispatcher.stop(Duration::from_secs(5)).await;
            sender.calls()
        });

        prop_assert_eq!(calls, payloads);
    }
}
