//! 有序投递调度器
//!
//! 单一生产者入队，N 个 worker 消费并投递到下游目标，
//! 带指数退避重试、滑动窗口熔断以及有截止时间的优雅关闭。

pub mod dispatcher;
pub mod in_flight;
pub mod reporter;
pub mod retry_policy;
pub mod shutdown;
mod worker;

pub use dispatcher::{Cancellation, Dispatcher, DispatcherBuilder};
pub use reporter::{DispatchStats, OutcomeReporter};
pub use retry_policy::RetryPolicy;
pub use shutdown::{LifecycleState, ShutdownCoordinator, ShutdownReport};
