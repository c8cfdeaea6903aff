use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// 正在被 worker 处理的条目。进行中的调用不能被取消，只能中止后续重试。
#[derive(Debug, Default)]
pub struct InFlightEntry {
    aborted: AtomicBool,
    notify: Notify,
}

impl InFlightEntry {
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// 等待直到被中止
    pub async fn aborted(&self) {
        while !self.is_aborted() {
            self.notify.notified().await;
        }
    }
}

/// 登记由 worker 持有的条目
///
/// 使用同步锁，以便在队列锁内完成登记（见 `OrderedQueue::dequeue_with`）。
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: Mutex<HashMap<u64, Arc<InFlightEntry>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Arc<InFlightEntry>>> {
        // 持锁期间不会 panic，中毒时数据仍然一致
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, sequence_id: u64) -> Arc<InFlightEntry> {
        let entry = Arc::new(InFlightEntry::default());
        self.entries().insert(sequence_id, Arc::clone(&entry));
        entry
    }

    /// 移除登记，仅当登记仍是 `entry` 本身时生效。
    ///
    /// 条目被放回队首后可能已被另一个 worker 重新登记。
    pub fn release(&self, sequence_id: u64, entry: &Arc<InFlightEntry>) {
        let mut entries = self.entries();
        if entries
            .get(&sequence_id)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            entries.remove(&sequence_id);
        }
    }

    /// 中止指定条目的重试链；条目不在处理中时返回 `false`
    pub fn abort(&self, sequence_id: u64) -> bool {
        match self.entries().get(&sequence_id) {
            Some(entry) => {
                entry.abort();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
