use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use courier_config::{
    AppConfig, CircuitBreakerConfig, ConfigValidator, DispatcherConfig, QueueConfig, RetryConfig,
};
use courier_domain::{DeadLetterSink, Outcome, OutcomeSink, Sender};
use courier_errors::{CourierError, CourierResult};
use courier_infrastructure::{CircuitBreaker, LoggingDeadLetterSink, MetricsCollector, OrderedQueue};

use crate::in_flight::InFlightRegistry;
use crate::reporter::{DispatchStats, OutcomeReporter};
use crate::retry_policy::RetryPolicy;
use crate::shutdown::{LifecycleState, ShutdownCoordinator, ShutdownReport};
use crate::worker::{DeliveryWorker, WorkerContext};

/// `Dispatcher::cancel` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// 条目仍在队列中，已原地移除
    Removed,
    /// 条目正在投递，当前调用不受影响，后续重试被中止
    RetryChainAborted,
    /// 条目已到达终态或从未存在
    NotFound,
}

pub struct DispatcherBuilder {
    sender: Arc<dyn Sender>,
    queue: QueueConfig,
    dispatcher: DispatcherConfig,
    retry: RetryConfig,
    circuit_breaker: CircuitBreakerConfig,
    shared_breaker: Option<Arc<CircuitBreaker>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    outcomes: Option<Arc<dyn OutcomeSink>>,
}

impl DispatcherBuilder {
    pub fn new(sender: Arc<dyn Sender>) -> Self {
        Self {
            sender,
            queue: QueueConfig::default(),
            dispatcher: DispatcherConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            shared_breaker: None,
            dead_letters: None,
            outcomes: None,
        }
    }

    /// 使用应用配置中与调度相关的各段
    pub fn with_app_config(mut self, config: &AppConfig) -> Self {
        self.queue = config.queue.clone();
        self.dispatcher = config.dispatcher.clone();
        self.retry = config.retry.clone();
        self.circuit_breaker = config.circuit_breaker.clone();
        self
    }

    pub fn queue_config(mut self, config: QueueConfig) -> Self {
        self.queue = config;
        self
    }

    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher = config;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.dispatcher.workers = workers;
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// 与其他调度器共享同一目标的熔断器，优先于 `circuit_breaker_config`
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.shared_breaker = Some(breaker);
        self
    }

    pub fn dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    pub fn outcome_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.outcomes = Some(sink);
        self
    }

    /// 校验配置并构造调度器。不会启动任何后台任务。
    pub fn build(self) -> CourierResult<Dispatcher> {
        let validate = |result: Result<(), courier_config::ConfigError>| {
            result.map_err(|e| CourierError::config_error(e.to_string()))
        };
        validate(self.queue.validate())?;
        validate(self.dispatcher.validate())?;
        validate(self.retry.validate())?;
        if self.shared_breaker.is_none() {
            validate(self.circuit_breaker.validate())?;
        }

        let breaker = self.shared_breaker.unwrap_or_else(|| {
            Arc::new(CircuitBreaker::with_config(
                self.sender.target(),
                self.circuit_breaker,
            ))
        });
        let outcomes: Arc<dyn OutcomeSink> = match self.outcomes {
            Some(sink) => sink,
            None => Arc::new(MetricsCollector::new()),
        };
        let dead_letters: Arc<dyn DeadLetterSink> = match self.dead_letters {
            Some(sink) => sink,
            None => Arc::new(LoggingDeadLetterSink),
        };

        let context = WorkerContext {
            queue: Arc::new(OrderedQueue::with_config(&self.queue)),
            sender: self.sender,
            breaker,
            retry_policy: RetryPolicy::new(&self.retry),
            dead_letters,
            reporter: Arc::new(OutcomeReporter::new(outcomes)),
            in_flight: Arc::new(InFlightRegistry::new()),
            config: self.dispatcher,
        };

        Ok(Dispatcher {
            context: Arc::new(context),
            coordinator: ShutdownCoordinator::new(),
        })
    }
}

/// 有序、可靠的投递调度器
///
/// 生产者通过 [`enqueue`](Self::enqueue) 写入；[`start`](Self::start) 启动
/// N 个 worker；[`stop`](Self::stop) 在截止时间内排空。
pub struct Dispatcher {
    context: Arc<WorkerContext>,
    coordinator: ShutdownCoordinator,
}

impl Dispatcher {
    pub fn builder(sender: Arc<dyn Sender>) -> DispatcherBuilder {
        DispatcherBuilder::new(sender)
    }

    /// 启动 worker。只能调用一次，且必须在 tokio 运行时中调用。
    pub async fn start(&self) -> CourierResult<()> {
        self.coordinator.mark_running()?;

        let workers = self.context.config.workers;
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = DeliveryWorker::new(
                id,
                Arc::clone(&self.context),
                self.coordinator.forced_receiver(),
            );
            handles.push(tokio::spawn(worker.run()));
        }
        self.coordinator.attach_workers(handles).await;

        info!(
            workers,
            downstream = self.context.sender.target(),
            "Dispatcher started"
        );
        Ok(())
    }

    /// 入队一个负载，返回序列号。关闭后返回 `QueueClosed`。
    pub async fn enqueue(&self, payload: impl Into<Vec<u8>>) -> CourierResult<u64> {
        let sequence_id = self.context.queue.enqueue(payload.into()).await?;
        self.context
            .reporter
            .queue_depth(self.context.queue.len().await);
        Ok(sequence_id)
    }

    /// 取消一个条目：仍在队列中则原地移除，正在投递则中止其重试链
    pub async fn cancel(&self, sequence_id: u64) -> Cancellation {
        if let Some(item) = self.context.queue.cancel(sequence_id).await {
            self.context.reporter.report(&item, Outcome::Cancelled).await;
            return Cancellation::Removed;
        }

        if self.context.in_flight.abort(sequence_id) {
            debug!(sequence_id, "Retry chain abort requested");
            return Cancellation::RetryChainAborted;
        }

        Cancellation::NotFound
    }

    /// 停止调度器，可重复调用
    pub async fn stop(&self, deadline: Duration) -> ShutdownReport {
        self.coordinator
            .stop(deadline, &self.context.queue, &self.context.reporter)
            .await
    }

    pub fn state(&self) -> LifecycleState {
        self.coordinator.state()
    }

    pub async fn stats(&self) -> DispatchStats {
        self.context.reporter.stats().await
    }

    pub async fn queue_len(&self) -> usize {
        self.context.queue.len().await
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.context.breaker
    }

    pub fn target(&self) -> &str {
        self.context.sender.target()
    }
}
