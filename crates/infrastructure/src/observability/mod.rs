//! Observability module
//!
//! Metrics and structured logging for delivery outcomes.

pub mod metrics_collector;

pub use metrics_collector::MetricsCollector;
