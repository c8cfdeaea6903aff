//! Test doubles for the sender and sink ports
//!
//! All doubles record what they saw behind `Arc<Mutex<..>>` so tests can
//! clone a handle, hand it to the dispatcher and inspect it afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use courier_domain::{
    DeadLetter, DeadLetterSink, Outcome, OutcomeEvent, OutcomeSink, SendResponse, Sender,
};
use courier_errors::{CourierError, CourierResult};

type Script = dyn Fn(&[u8], u32) -> CourierResult<SendResponse> + Send + Sync;

/// Sender whose response is decided by a script.
///
/// The script receives the payload and the 1-based attempt number for that
/// payload, so "fail the first attempt of every 5th item" is a one-liner.
#[derive(Clone)]
pub struct ScriptedSender {
    target: String,
    script: Arc<Script>,
    latency: Duration,
    calls: Arc<Mutex<Vec<Vec<u8>>>>,
    attempts: Arc<Mutex<HashMap<Vec<u8>, u32>>>,
}

impl ScriptedSender {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&[u8], u32) -> CourierResult<SendResponse> + Send + Sync + 'static,
    {
        Self {
            target: "mock-target".to_string(),
            script: Arc::new(script),
            latency: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn always_ok() -> Self {
        Self::new(|_, _| Ok(SendResponse::ok()))
    }

    pub fn always_transient() -> Self {
        Self::new(|_, _| Err(CourierError::transient("HTTP 503")))
    }

    pub fn always_permanent() -> Self {
        Self::new(|_, _| Err(CourierError::permanent("HTTP 400 - invalid payload")))
    }

    /// Fails transiently `failures` times per payload, then succeeds
    pub fn fail_first(failures: u32) -> Self {
        Self::new(move |_, attempt| {
            if attempt <= failures {
                Err(CourierError::transient("HTTP 503"))
            } else {
                Ok(SendResponse::ok())
            }
        })
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = target.to_string();
        self
    }

    /// Simulated time spent in each send
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every payload in call order, retries included
    pub fn calls(&self) -> Vec<Vec<u8>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn attempts_for(&self, payload: &[u8]) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(payload)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Sender for ScriptedSender {
    fn target(&self) -> &str {
        &self.target
    }

    async fn send(&self, payload: &[u8]) -> CourierResult<SendResponse> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(payload.to_vec()).or_insert(0);
            *counter += 1;
            *counter
        };
        self.calls.lock().unwrap().push(payload.to_vec());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        (self.script)(payload, attempt)
    }
}

/// Sender that blocks every call until the test releases it.
#[derive(Clone)]
pub struct GatedSender {
    gate: Arc<Semaphore>,
    started: Arc<AtomicUsize>,
    started_notify: Arc<Notify>,
    delivered: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Default for GatedSender {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedSender {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            started: Arc::new(AtomicUsize::new(0)),
            started_notify: Arc::new(Notify::new()),
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Let `n` blocked or future sends complete successfully
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Number of sends that have started (blocked or finished)
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` sends have started
    pub async fn wait_started(&self, n: usize) {
        loop {
            let notified = self.started_notify.notified();
            if self.started() >= n {
                return;
            }
            notified.await;
        }
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sender for GatedSender {
    fn target(&self) -> &str {
        "gated-target"
    }

    async fn send(&self, payload: &[u8]) -> CourierResult<SendResponse> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.started_notify.notify_waiters();

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| CourierError::Internal(e.to_string()))?;
        permit.forget();

        self.delivered.lock().unwrap().push(payload.to_vec());
        Ok(SendResponse::ok())
    }
}

/// Dead-letter sink that keeps everything it receives
#[derive(Clone, Default)]
pub struct RecordingDeadLetterSink {
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    delay: Duration,
}

impl RecordingDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside `accept` before recording
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.dead_letters.lock().unwrap().len()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingDeadLetterSink {
    async fn accept(&self, dead_letter: DeadLetter) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.dead_letters.lock().unwrap().push(dead_letter);
    }
}

/// Outcome sink that keeps every event and signal
#[derive(Clone, Default)]
pub struct RecordingOutcomeSink {
    events: Arc<Mutex<Vec<OutcomeEvent>>>,
    retries: Arc<Mutex<Vec<(u64, u32)>>>,
    circuit_rejections: Arc<AtomicUsize>,
    last_queue_depth: Arc<AtomicUsize>,
}

impl RecordingOutcomeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutcomeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn with_outcome(&self, outcome: Outcome) -> Vec<OutcomeEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.outcome == outcome)
            .collect()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.with_outcome(outcome).len()
    }

    pub fn event_for(&self, sequence_id: u64) -> Option<OutcomeEvent> {
        self.events()
            .into_iter()
            .find(|event| event.sequence_id == sequence_id)
    }

    pub fn retries(&self) -> Vec<(u64, u32)> {
        self.retries.lock().unwrap().clone()
    }

    pub fn circuit_rejections(&self) -> usize {
        self.circuit_rejections.load(Ordering::SeqCst)
    }

    pub fn last_queue_depth(&self) -> usize {
        self.last_queue_depth.load(Ordering::SeqCst)
    }
}

impl OutcomeSink for RecordingOutcomeSink {
    fn record(&self, event: &OutcomeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn record_retry(&self, sequence_id: u64, attempt: u32) {
        self.retries.lock().unwrap().push((sequence_id, attempt));
    }

    fn record_circuit_rejection(&self, _target: &str) {
        self.circuit_rejections.fetch_add(1, Ordering::SeqCst);
    }

    fn record_queue_depth(&self, depth: usize) {
        self.last_queue_depth.store(depth, Ordering::SeqCst);
    }
}
