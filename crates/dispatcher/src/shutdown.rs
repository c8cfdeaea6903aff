use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use courier_domain::Outcome;
use courier_errors::{CourierError, CourierResult};
use courier_infrastructure::OrderedQueue;

use crate::reporter::{DispatchStats, OutcomeReporter};

/// 调度器生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// 已构造，尚未启动 worker
    Created,
    Running,
    Draining,
    Stopped,
}

/// 一次关闭的结果
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub state: LifecycleState,
    /// 是否在截止时间前自然排空
    pub drained: bool,
    /// 截止时间到达时仍未投递的序列号
    pub undelivered: Vec<u64>,
    pub stats: DispatchStats,
    pub elapsed: Duration,
}

/// 优雅关闭协调器
///
/// `RUNNING -> DRAINING -> STOPPED`。关闭队列后等待 worker 自然排空；
/// 截止时间到达则发出强制信号，剩余条目全部报告为未投递。
pub struct ShutdownCoordinator {
    state_tx: watch::Sender<LifecycleState>,
    /// 截止时间到达后置为 true
    forced_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    report: Mutex<Option<ShutdownReport>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Created);
        let (forced_tx, _) = watch::channel(false);
        Self {
            state_tx,
            forced_tx,
            workers: Mutex::new(Vec::new()),
            report: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    pub fn forced_receiver(&self) -> watch::Receiver<bool> {
        self.forced_tx.subscribe()
    }

    /// `Created -> Running`，其余状态下返回错误
    pub fn mark_running(&self) -> CourierResult<()> {
        let mut result = Ok(());
        self.state_tx.send_if_modified(|state| match *state {
            LifecycleState::Created => {
                *state = LifecycleState::Running;
                true
            }
            other => {
                result = Err(CourierError::Internal(format!(
                    "调度器无法启动，当前状态: {other:?}"
                )));
                false
            }
        });
        result
    }

    pub async fn attach_workers(&self, handles: Vec<JoinHandle<()>>) {
        self.workers.lock().await.extend(handles);
    }

    /// 进入 DRAINING。只有第一次调用返回 true。
    fn begin_drain(&self) -> bool {
        self.state_tx.send_if_modified(|state| match *state {
            LifecycleState::Created | LifecycleState::Running => {
                *state = LifecycleState::Draining;
                true
            }
            LifecycleState::Draining | LifecycleState::Stopped => false,
        })
    }

    /// 停止调度器，可重复调用
    ///
    /// 第一次调用执行关闭流程；之后的调用（包括并发调用）等待 STOPPED
    /// 并返回同一份报告。
    pub async fn stop(
        &self,
        deadline: Duration,
        queue: &OrderedQueue,
        reporter: &OutcomeReporter,
    ) -> ShutdownReport {
        if !self.begin_drain() {
            debug!("关闭流程已经在进行或已完成");
            return self.wait_for_report().await;
        }

        let started = Instant::now();
        info!(deadline_ms = deadline.as_millis() as u64, "开始优雅关闭");

        queue.close().await;

        // 只取一次 JoinHandle，保证每个 worker 只被等待一次
        let handles = std::mem::take(&mut *self.workers.lock().await);
        let worker_count = handles.len();
        let mut join = Box::pin(join_all(handles));

        let drained = match tokio::time::timeout(deadline, &mut join).await {
            Ok(results) => {
                log_join_errors(results);
                true
            }
            Err(_) => {
                warn!(
                    "关闭截止时间已到，强制停止 {} 个 worker",
                    worker_count
                );
                self.forced_tx.send_replace(true);

                Self::report_remaining(queue, reporter).await;
                log_join_errors(join.await);
                false
            }
        };

        // worker 退出前可能放回队首的条目，或从未启动过 worker 时的全部条目
        Self::report_remaining(queue, reporter).await;

        let report = ShutdownReport {
            state: LifecycleState::Stopped,
            drained: drained && reporter.undelivered().await.is_empty(),
            undelivered: reporter.undelivered().await,
            stats: reporter.stats().await,
            elapsed: started.elapsed(),
        };

        *self.report.lock().await = Some(report.clone());
        self.state_tx.send_replace(LifecycleState::Stopped);

        info!(
            acked = report.stats.acked,
            dead_lettered = report.stats.dead_lettered,
            undelivered = report.undelivered.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "调度器已停止"
        );

        report
    }

    async fn report_remaining(queue: &OrderedQueue, reporter: &OutcomeReporter) {
        let remaining = queue.drain_remaining().await;
        if remaining.is_empty() {
            return;
        }

        warn!("{} 个条目在关闭时未投递", remaining.len());
        for item in &remaining {
            reporter.report(item, Outcome::Undelivered).await;
        }
    }

    async fn wait_for_report(&self) -> ShutdownReport {
        let mut state_rx = self.state_tx.subscribe();
        // 发送端由 self 持有，wait_for 不会因通道关闭而失败
        let _ = state_rx
            .wait_for(|state| *state == LifecycleState::Stopped)
            .await;

        match self.report.lock().await.clone() {
            Some(report) => report,
            None => ShutdownReport {
                state: self.state(),
                drained: false,
                undelivered: Vec::new(),
                stats: DispatchStats::default(),
                elapsed: Duration::ZERO,
            },
        }
    }
}

fn log_join_errors(results: Vec<Result<(), tokio::task::JoinError>>) {
    for result in results {
        if let Err(e) = result {
            error!("worker 异常退出: {}", e);
        }
    }
}
