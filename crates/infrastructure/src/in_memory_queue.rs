use std::collections::VecDeque;
use std::time::Duration;

use courier_config::{OverflowPolicy, QueueConfig};
use courier_domain::WorkItem;
use courier_errors::{CourierError, CourierResult};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// 有界、有序的内存队列
///
/// 所有条目按入队顺序出队（FIFO），序列号在锁内分配，因此序列号顺序
/// 即全局插入顺序。容量满时按配置阻塞或立即拒绝；`close()` 之后拒绝
/// 新条目，但已入队的条目仍可被消费直到排空。
#[derive(Debug)]
pub struct OrderedQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    overflow: OverflowPolicy,
    /// 阻塞模式下等待空位的超时
    enqueue_timeout: Option<Duration>,
    item_available: Notify,
    space_available: Notify,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<WorkItem>,
    next_sequence: u64,
    closed: bool,
}

/// 队列统计信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    pub closed: bool,
    /// 最近一次分配的序列号
    pub last_sequence_id: u64,
}

impl OrderedQueue {
    /// 阻塞模式、无超时
    pub fn new(capacity: usize) -> Self {
        Self::with_config(&QueueConfig {
            capacity,
            ..QueueConfig::default()
        })
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        let enqueue_timeout = if config.enqueue_timeout_ms > 0 {
            Some(Duration::from_millis(config.enqueue_timeout_ms))
        } else {
            None
        };

        debug!(
            capacity = config.capacity,
            overflow = ?config.overflow,
            "Creating ordered queue"
        );

        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(config.capacity.min(4096)),
                next_sequence: 0,
                closed: false,
            }),
            capacity: config.capacity,
            overflow: config.overflow,
            enqueue_timeout,
            item_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 入队一个负载，返回分配的序列号
    ///
    /// 队列满时：`Block` 模式等待空位（若配置了超时，超时后返回 `QueueFull`），
    /// `Reject` 模式立即返回 `QueueFull`。关闭后总是返回 `QueueClosed`，
    /// 包括在等待空位期间被关闭的情况。
    pub async fn enqueue(&self, payload: Vec<u8>) -> CourierResult<u64> {
        match self.enqueue_timeout {
            Some(limit) => tokio::time::timeout(limit, self.enqueue_inner(payload))
                .await
                .map_err(|_| {
                    warn!("Backpressure timeout after {:?}, payload rejected", limit);
                    CourierError::QueueFull {
                        capacity: self.capacity,
                    }
                })?,
            None => self.enqueue_inner(payload).await,
        }
    }

    async fn enqueue_inner(&self, payload: Vec<u8>) -> CourierResult<u64> {
        loop {
            let mut state = self.state.lock().await;

            if state.closed {
                return Err(CourierError::QueueClosed);
            }

            if state.items.len() < self.capacity {
                state.next_sequence += 1;
                let sequence_id = state.next_sequence;
                state.items.push_back(WorkItem::new(sequence_id, payload));
                drop(state);

                self.item_available.notify_one();
                return Ok(sequence_id);
            }

            if self.overflow == OverflowPolicy::Reject {
                return Err(CourierError::QueueFull {
                    capacity: self.capacity,
                });
            }

            // 在持锁时创建 Notified，避免丢失 close() 的 notify_waiters
            let notified = self.space_available.notified();
            drop(state);
            notified.await;
        }
    }

    /// 取出队首条目；队列为空时等待。
    ///
    /// 返回 `None` 表示 EndOfStream：队列已关闭且已排空。
    pub async fn dequeue(&self) -> Option<WorkItem> {
        self.dequeue_with(|_| ()).await.map(|(item, ())| item)
    }

    /// 同 `dequeue`，但 `claim` 在出队的同一把锁内执行。
    ///
    /// 调用方借此在条目离开队列之前登记它，外部观察者看到的条目
    /// 要么仍在队列中，要么已被登记，没有中间状态。
    pub async fn dequeue_with<R>(
        &self,
        claim: impl FnOnce(&WorkItem) -> R,
    ) -> Option<(WorkItem, R)> {
        let mut claim = Some(claim);
        loop {
            let mut state = self.state.lock().await;

            if let Some(item) = state.items.pop_front() {
                let claimed = claim.take().map(|claim| claim(&item));
                drop(state);
                self.space_available.notify_one();
                return claimed.map(|claimed| (item, claimed));
            }

            if state.closed {
                return None;
            }

            let notified = self.item_available.notified();
            drop(state);
            notified.await;
        }
    }

    /// 把条目放回队首，保持它相对后续条目的顺序。
    ///
    /// 不会突破容量：队列已满时原样返回条目。关闭后仍然允许，
    /// 因为该条目在关闭前已被接收。
    pub async fn requeue_front(&self, item: WorkItem) -> Result<(), WorkItem> {
        let mut state = self.state.lock().await;
        if state.items.len() >= self.capacity {
            return Err(item);
        }

        debug!(sequence_id = item.sequence_id(), "Requeueing item at front");
        state.items.push_front(item);
        drop(state);

        self.item_available.notify_one();
        Ok(())
    }

    /// 原地移除仍在队列中的条目
    pub async fn cancel(&self, sequence_id: u64) -> Option<WorkItem> {
        let mut state = self.state.lock().await;
        let position = state
            .items
            .iter()
            .position(|item| item.sequence_id() == sequence_id)?;
        let removed = state.items.remove(position);
        drop(state);

        if removed.is_some() {
            debug!(sequence_id, "Cancelled queued item");
            self.space_available.notify_one();
        }
        removed
    }

    /// 关闭队列：拒绝新条目，唤醒所有等待者
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        let remaining = state.items.len();
        drop(state);

        info!(remaining, "Ordered queue closed");
        self.item_available.notify_waiters();
        self.space_available.notify_waiters();
    }

    /// 取走所有剩余条目（按顺序），用于强制关闭
    pub async fn drain_remaining(&self) -> Vec<WorkItem> {
        let mut state = self.state.lock().await;
        let drained: Vec<WorkItem> = state.items.drain(..).collect();
        drop(state);

        if !drained.is_empty() {
            self.space_available.notify_waiters();
        }
        drained
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.items.is_empty()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            depth: state.items.len(),
            capacity: self.capacity,
            closed: state.closed,
            last_sequence_id: state.next_sequence,
        }
    }
}
