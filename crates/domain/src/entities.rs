use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_errors::ErrorKind;

/// 待投递的工作单元
///
/// 除 `attempts` 外不可变；`attempts` 只由当前处理它的 worker 修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    sequence_id: u64,
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    attempts: u32,
}

impl WorkItem {
    pub fn new(sequence_id: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence_id,
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// 记录一次投递尝试，返回累计尝试次数
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// 从入队到现在经过的时间
    pub fn age(&self) -> Duration {
        (Utc::now() - self.enqueued_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// 重试耗尽或遇到永久性错误的条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub item: WorkItem,
    pub final_error: ErrorKind,
    pub reason: String,
    pub total_attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(item: WorkItem, final_error: ErrorKind, reason: impl Into<String>) -> Self {
        let total_attempts = item.attempts();
        Self {
            item,
            final_error,
            reason: reason.into(),
            total_attempts,
            dead_lettered_at: Utc::now(),
        }
    }

    pub fn sequence_id(&self) -> u64 {
        self.item.sequence_id()
    }
}

/// 单个条目的重试状态，条目进入终态后丢弃
#[derive(Debug, Clone, Default)]
pub struct RetryContext {
    pub attempt: u32,
    pub last_error: Option<ErrorKind>,
    pub next_delay: Duration,
}

impl RetryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self, attempt: u32, kind: ErrorKind, next_delay: Duration) {
        self.attempt = attempt;
        self.last_error = Some(kind);
        self.next_delay = next_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_attempts() {
        let mut item = WorkItem::new(7, b"hello".to_vec());
        assert_eq!(item.sequence_id(), 7);
        assert_eq!(item.payload(), b"hello");
        assert_eq!(item.attempts(), 0);

        assert_eq!(item.record_attempt(), 1);
        assert_eq!(item.record_attempt(), 2);
        assert_eq!(item.attempts(), 2);
    }

    #[test]
    fn test_dead_letter_captures_attempts() {
        let mut item = WorkItem::new(3, b"{}".to_vec());
        item.record_attempt();
        item.record_attempt();
        item.record_attempt();

        let dead_letter = DeadLetter::new(item, ErrorKind::Transient, "HTTP 503");
        assert_eq!(dead_letter.total_attempts, 3);
        assert_eq!(dead_letter.sequence_id(), 3);
        assert_eq!(dead_letter.final_error, ErrorKind::Transient);
    }

    #[test]
    fn test_dead_letter_serializes_to_json() {
        let item = WorkItem::new(1, vec![1, 2, 3]);
        let dead_letter = DeadLetter::new(item, ErrorKind::Permanent, "HTTP 400");

        let json = serde_json::to_value(&dead_letter).unwrap();
        assert_eq!(json["final_error"], "permanent");
        assert_eq!(json["item"]["sequence_id"], 1);
        assert_eq!(json["reason"], "HTTP 400");
    }

    #[test]
    fn test_retry_context_records_failure() {
        let mut ctx = RetryContext::new();
        assert!(ctx.last_error.is_none());

        ctx.record_failure(2, ErrorKind::Transient, Duration::from_millis(150));
        assert_eq!(ctx.attempt, 2);
        assert_eq!(ctx.last_error, Some(ErrorKind::Transient));
        assert_eq!(ctx.next_delay, Duration::from_millis(150));
    }
}
