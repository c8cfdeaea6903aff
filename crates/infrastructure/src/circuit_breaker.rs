//! Sliding-window circuit breaker
//!
//! The breaker tracks the outcomes of the last `window_size` completed calls.
//! It opens when at least `minimum_calls` samples are present and the failure
//! ratio is strictly greater than `failure_threshold`. After `cooldown` the
//! next `allow()` moves it to half-open and admits exactly one trial call.
//!
//! Every admitted call carries a [`CallPermit`] stamped with the state
//! generation it was admitted in. Outcomes from an older generation only
//! update the totals; they never move the window or the state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use courier_config::{CircuitBreakerConfig, CircuitState};

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub window_calls: usize,
    pub window_failures: usize,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Calls refused while open or while a trial call was in flight
    pub rejected_calls: u64,
    pub last_state_change: Instant,
}

impl CircuitBreakerStats {
    pub fn failure_rate(&self) -> f64 {
        if self.window_calls == 0 {
            0.0
        } else {
            self.window_failures as f64 / self.window_calls as f64
        }
    }
}

/// Proof that `allow()` admitted a call; hand it back to `record_outcome`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPermit {
    generation: u64,
    trial: bool,
}

impl CallPermit {
    /// Whether this call is the single half-open trial call
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Bumped on every transition
    generation: u64,
    /// `true` marks a failure
    window: VecDeque<bool>,
    trial_in_flight: bool,
    opened_at: Option<Instant>,
    last_state_change: Instant,
    total_successes: u64,
    total_failures: u64,
    rejected_calls: u64,
}

impl BreakerState {
    fn new(window_size: usize, generation: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            generation,
            window: VecDeque::with_capacity(window_size),
            trial_in_flight: false,
            opened_at: None,
            last_state_change: Instant::now(),
            total_successes: 0,
            total_failures: 0,
            rejected_calls: 0,
        }
    }

    fn window_failures(&self) -> usize {
        self.window.iter().filter(|failed| **failed).count()
    }

    fn transition(&mut self, to: CircuitState) {
        self.state = to;
        self.generation += 1;
        self.last_state_change = Instant::now();
        match to {
            CircuitState::Open => {
                self.opened_at = Some(self.last_state_change);
                self.trial_in_flight = false;
            }
            CircuitState::HalfOpen => {
                self.trial_in_flight = false;
            }
            CircuitState::Closed => {
                self.opened_at = None;
                self.trial_in_flight = false;
                self.window.clear();
            }
        }
    }

    fn cooldown_elapsed(&self, cooldown: Duration) -> bool {
        self.opened_at
            .map(|opened| opened.elapsed() >= cooldown)
            .unwrap_or(true)
    }
}

/// Circuit breaker guarding a single downstream target
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window_size = config.window_size;
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState::new(window_size, 0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask permission to send.
    ///
    /// Returns `None` while open, or while half-open with the trial call already
    /// taken. A rejection is counted separately and never enters the window.
    pub async fn allow(&self) -> Option<CallPermit> {
        let mut state = self.state.write().await;

        if state.state == CircuitState::Open {
            if !state.cooldown_elapsed(self.config.cooldown) {
                state.rejected_calls += 1;
                return None;
            }
            info!(breaker = %self.name, "Circuit breaker cooldown elapsed, half-open");
            state.transition(CircuitState::HalfOpen);
        }

        match state.state {
            CircuitState::HalfOpen if state.trial_in_flight => {
                state.rejected_calls += 1;
                None
            }
            CircuitState::HalfOpen => {
                state.trial_in_flight = true;
                Some(CallPermit {
                    generation: state.generation,
                    trial: true,
                })
            }
            _ => Some(CallPermit {
                generation: state.generation,
                trial: false,
            }),
        }
    }

    /// Record the outcome of a call admitted by `allow()`.
    pub async fn record_outcome(&self, permit: CallPermit, success: bool) {
        let mut state = self.state.write().await;

        if success {
            state.total_successes += 1;
        } else {
            state.total_failures += 1;
        }

        if permit.generation != state.generation {
            debug!(
                breaker = %self.name,
                success,
                "Outcome from a call admitted before the last transition, state unchanged"
            );
            return;
        }

        match state.state {
            CircuitState::HalfOpen => {
                if !permit.trial {
                    return;
                }
                if success {
                    info!(breaker = %self.name, "Trial call succeeded, circuit closed");
                    state.transition(CircuitState::Closed);
                } else {
                    warn!(breaker = %self.name, "Trial call failed, circuit re-opened");
                    state.transition(CircuitState::Open);
                }
            }
            CircuitState::Closed => {
                if state.window.len() == self.config.window_size {
                    state.window.pop_front();
                }
                state.window.push_back(!success);

                let calls = state.window.len();
                let failures = state.window_failures();
                if calls >= self.config.minimum_calls
                    && failures as f64 / calls as f64 > self.config.failure_threshold
                {
                    warn!(
                        breaker = %self.name,
                        failures,
                        calls,
                        threshold = self.config.failure_threshold,
                        "Failure ratio exceeded threshold, circuit opened"
                    );
                    state.transition(CircuitState::Open);
                }
            }
            // 打开状态下不会发放许可，同一代的结果不会出现在这里
            CircuitState::Open => {}
        }
    }

    pub async fn record_success(&self, permit: CallPermit) {
        self.record_outcome(permit, true).await
    }

    pub async fn record_failure(&self, permit: CallPermit) {
        self.record_outcome(permit, false).await
    }

    /// Current state, applying the lazy open -> half-open transition
    pub async fn state(&self) -> CircuitState {
        let mut state = self.state.write().await;
        if state.state == CircuitState::Open && state.cooldown_elapsed(self.config.cooldown) {
            state.transition(CircuitState::HalfOpen);
        }
        state.state
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let state = self.state.read().await;
        CircuitBreakerStats {
            state: state.state,
            window_calls: state.window.len(),
            window_failures: state.window_failures(),
            total_successes: state.total_successes,
            total_failures: state.total_failures,
            rejected_calls: state.rejected_calls,
            last_state_change: state.last_state_change,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        info!(breaker = %self.name, "Circuit breaker reset");
        // 代数延续，重置前发放的许可不会影响新状态
        let generation = state.generation + 1;
        *state = BreakerState::new(self.config.window_size, generation);
    }

    /// Open the breaker now; the cooldown starts from this call
    pub async fn force_open(&self) {
        let mut state = self.state.write().await;
        warn!(breaker = %self.name, "Circuit breaker forced open");
        state.transition(CircuitState::Open);
    }
}

/// One breaker per downstream target
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(target) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write().await;
        Arc::clone(breakers.entry(target.to_string()).or_insert_with(|| {
            debug!(downstream = target, "Creating circuit breaker");
            Arc::new(CircuitBreaker::with_config(target, self.config.clone()))
        }))
    }

    pub async fn get(&self, target: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(target).cloned()
    }

    pub async fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.breakers.read().await.keys().cloned().collect();
        targets.sort();
        targets
    }

    pub async fn reset_all(&self) {
        for breaker in self.breakers.read().await.values() {
            breaker.reset().await;
        }
    }
}
