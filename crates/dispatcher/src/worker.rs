//! 投递 worker
//!
//! 每个 worker 对取出的条目执行同一个状态机：
//! `FETCHED -> SENDING -> {ACKED | RETRY_SCHEDULED | DEAD_LETTERED}`。
//! 熔断打开时条目在短暂等待后放回队首；强制关闭时手上的条目报告为未投递。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use courier_config::DispatcherConfig;
use courier_domain::{
    DeadLetter, DeadLetterSink, ErrorKind, Outcome, RetryContext, SendResponse, Sender, WorkItem,
};
use courier_errors::{CourierError, CourierResult};
use courier_infrastructure::{CircuitBreaker, OrderedQueue};

use crate::in_flight::{InFlightEntry, InFlightRegistry};
use crate::reporter::OutcomeReporter;
use crate::retry_policy::RetryPolicy;

/// worker 之间共享的组件
pub(crate) struct WorkerContext {
    pub queue: Arc<OrderedQueue>,
    pub sender: Arc<dyn Sender>,
    pub breaker: Arc<CircuitBreaker>,
    pub retry_policy: RetryPolicy,
    pub dead_letters: Arc<dyn DeadLetterSink>,
    pub reporter: Arc<OutcomeReporter>,
    pub in_flight: Arc<InFlightRegistry>,
    pub config: DispatcherConfig,
}

/// 单个条目的处理结果
#[derive(Debug)]
enum Disposition {
    Acked,
    DeadLettered { kind: ErrorKind, reason: String },
    Cancelled,
    Undelivered,
    /// 已放回队首，由之后的 dequeue 再次处理
    Requeued,
}

#[derive(Debug, PartialEq, Eq)]
enum Wake {
    Elapsed,
    Aborted,
    Forced,
}

/// 等待强制关闭信号。发送端被丢弃时永远不会返回。
pub(crate) async fn forced(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|forced| *forced).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub(crate) struct DeliveryWorker {
    id: usize,
    ctx: Arc<WorkerContext>,
    forced: watch::Receiver<bool>,
}

impl DeliveryWorker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>, forced: watch::Receiver<bool>) -> Self {
        Self { id, ctx, forced }
    }

    pub async fn run(mut self) {
        info!(worker_id = self.id, "Delivery worker started");

        loop {
            // 出队与登记在同一把队列锁内完成，取消请求总能找到条目
            let in_flight = Arc::clone(&self.ctx.in_flight);
            let claimed = tokio::select! {
                biased;
                _ = forced(&mut self.forced) => {
                    debug!(worker_id = self.id, "Shutdown deadline reached, worker exiting");
                    break;
                }
                claimed = self.ctx.queue.dequeue_with(|item| in_flight.register(item.sequence_id())) => {
                    match claimed {
                        Some(claimed) => claimed,
                        None => {
                            debug!(worker_id = self.id, "Queue drained, worker exiting");
                            break;
                        }
                    }
                }
            };
            let (item, entry) = claimed;

            self.ctx.reporter.queue_depth(self.ctx.queue.len().await);

            if *self.forced.borrow() {
                self.ctx.in_flight.release(item.sequence_id(), &entry);
                self.ctx.reporter.report(&item, Outcome::Undelivered).await;
                break;
            }

            self.process(item, entry).await;
        }

        info!(worker_id = self.id, "Delivery worker stopped");
    }

    async fn process(&mut self, mut item: WorkItem, entry: Arc<InFlightEntry>) {
        let sequence_id = item.sequence_id();
        debug!(worker_id = self.id, sequence_id, "FETCHED");

        let disposition = self.deliver(&mut item, &entry).await;
        self.ctx.in_flight.release(sequence_id, &entry);

        // 放回队首的条目已不属于本 worker
        if !matches!(disposition, Disposition::Requeued) {
            self.finish(item, disposition).await;
        }
    }

    /// 调用发送器；发送器 panic 时转换为永久性错误，worker 继续运行
    async fn send(&self, item: &WorkItem) -> CourierResult<SendResponse> {
        match AssertUnwindSafe(self.ctx.sender.send(item.payload()))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    worker_id = self.id,
                    sequence_id = item.sequence_id(),
                    "Sender panicked: {}",
                    message
                );
                Err(CourierError::Internal(format!("sender panicked: {message}")))
            }
        }
    }

    async fn deliver(&mut self, item: &mut WorkItem, entry: &InFlightEntry) -> Disposition {
        let target = self.ctx.sender.target().to_string();
        let mut retry = RetryContext::new();

        loop {
            if entry.is_aborted() {
                return Disposition::Cancelled;
            }

            let Some(permit) = self.ctx.breaker.allow().await else {
                self.ctx.reporter.circuit_rejection(&target);
                debug!(
                    worker_id = self.id,
                    sequence_id = item.sequence_id(),
                    downstream = %target,
                    "Circuit open, deferring item"
                );

                match self.pause(self.ctx.config.circuit_open_delay(), entry).await {
                    Wake::Forced => return Disposition::Undelivered,
                    Wake::Aborted => return Disposition::Cancelled,
                    Wake::Elapsed => {}
                }

                match self.ctx.queue.requeue_front(item.clone()).await {
                    Ok(()) => return Disposition::Requeued,
                    // 队首已被占满，继续持有并重新检查熔断器
                    Err(_) => continue,
                }
            };

            let attempt = item.record_attempt();
            debug!(
                worker_id = self.id,
                sequence_id = item.sequence_id(),
                attempt,
                "SENDING"
            );

            let error = match self.send(item).await {
                Ok(response) => {
                    self.ctx.breaker.record_outcome(permit, true).await;
                    debug!(
                        sequence_id = item.sequence_id(),
                        status = response.status,
                        "ACKED"
                    );
                    return Disposition::Acked;
                }
                Err(error) => error,
            };

            let kind = error.kind();
            // 只有临时性失败计入熔断窗口；永久性错误说明下游仍在正常应答
            self.ctx.breaker
                .record_outcome(permit, !kind.is_retryable())
                .await;

            if !self.ctx.retry_policy.should_retry(kind, attempt) {
                if kind.is_retryable() {
                    warn!(
                        sequence_id = item.sequence_id(),
                        attempts = attempt,
                        "Retry budget exhausted: {}",
                        error
                    );
                } else {
                    warn!(
                        sequence_id = item.sequence_id(),
                        "Permanent delivery failure: {}",
                        error
                    );
                }
                return Disposition::DeadLettered {
                    kind,
                    reason: error.to_string(),
                };
            }

            if entry.is_aborted() {
                return Disposition::Cancelled;
            }

            let delay = self.ctx.retry_policy.next_delay(attempt - 1);
            retry.record_failure(attempt, kind, delay);
            self.ctx.reporter.retry(item.sequence_id(), attempt);
            debug!(
                sequence_id = item.sequence_id(),
                attempt = retry.attempt,
                delay_ms = retry.next_delay.as_millis() as u64,
                "RETRY_SCHEDULED: {}",
                error
            );

            match self.pause(retry.next_delay, entry).await {
                Wake::Elapsed => {}
                Wake::Aborted => return Disposition::Cancelled,
                Wake::Forced => return Disposition::Undelivered,
            }
        }
    }

    async fn pause(&mut self, delay: Duration, entry: &InFlightEntry) -> Wake {
        tokio::select! {
            biased;
            _ = forced(&mut self.forced) => Wake::Forced,
            _ = entry.aborted() => Wake::Aborted,
            _ = tokio::time::sleep(delay) => Wake::Elapsed,
        }
    }

    async fn finish(&self, item: WorkItem, disposition: Disposition) {
        match disposition {
            Disposition::Acked => {
                self.ctx.reporter.report(&item, Outcome::Acked).await;
            }
            Disposition::DeadLettered { kind, reason } => {
                self.ctx.reporter.report(&item, Outcome::DeadLettered).await;

                let sequence_id = item.sequence_id();
                let dead_letter = DeadLetter::new(item, kind, reason);
                let timeout = self.ctx.config.dead_letter_timeout();
                if tokio::time::timeout(timeout, self.ctx.dead_letters.accept(dead_letter))
                    .await
                    .is_err()
                {
                    error!(
                        sequence_id,
                        "Dead letter sink did not accept within {:?}", timeout
                    );
                }
            }
            Disposition::Cancelled => {
                info!(sequence_id = item.sequence_id(), "Retry chain aborted");
                self.ctx.reporter.report(&item, Outcome::Cancelled).await;
            }
            Disposition::Undelivered => {
                self.ctx.reporter.report(&item, Outcome::Undelivered).await;
            }
            Disposition::Requeued => {}
        }
    }
}
