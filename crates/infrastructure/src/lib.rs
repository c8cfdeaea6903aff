pub mod circuit_breaker;
pub mod dead_letter;
pub mod http_sender;
pub mod in_memory_queue;
pub mod observability;
pub mod sender_factory;
pub mod stdout_sender;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerRegistry, CircuitBreakerStats};
pub use dead_letter::{ChannelDeadLetterSink, JsonlDeadLetterSink, LoggingDeadLetterSink};
pub use http_sender::HttpSender;
pub use in_memory_queue::{OrderedQueue, QueueStats};
pub use observability::MetricsCollector;
pub use sender_factory::{create_sender, SenderFactory};
pub use stdout_sender::StdoutSender;
