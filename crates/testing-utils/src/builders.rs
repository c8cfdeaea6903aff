//! Config builders tuned for fast tests
//!
//! Production defaults use hundreds of milliseconds of backoff and a
//! thirty second cooldown; these keep the same shape at test speed.

use std::time::Duration;

use courier_config::{CircuitBreakerConfig, DispatcherConfig, QueueConfig, RetryConfig};

/// Retry config with millisecond backoff
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Breaker that never trips during a test
pub fn lenient_breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        window_size: 100,
        failure_threshold: 1.0,
        minimum_calls: 100,
        cooldown: Duration::from_millis(50),
    }
}

/// Breaker with `minimum_calls == window_size`
pub fn breaker(window_size: usize, failure_threshold: f64, cooldown: Duration) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        window_size,
        failure_threshold,
        minimum_calls: window_size,
        cooldown,
    }
}

pub fn dispatcher(workers: usize) -> DispatcherConfig {
    DispatcherConfig {
        workers,
        circuit_open_delay_ms: 5,
        dead_letter_timeout_ms: 200,
    }
}

pub fn queue(capacity: usize) -> QueueConfig {
    QueueConfig {
        capacity,
        ..QueueConfig::default()
    }
}

/// `b"item-{i}"`
pub fn payload(i: u64) -> Vec<u8> {
    format!("item-{i}").into_bytes()
}

/// Inverse of [`payload`]
pub fn payload_index(payload: &[u8]) -> Option<u64> {
    std::str::from_utf8(payload)
        .ok()?
        .strip_prefix("item-")?
        .parse()
        .ok()
}
