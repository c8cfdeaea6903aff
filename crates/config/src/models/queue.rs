use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// 队列写满时生产者的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 阻塞等待空位（可选超时）
    Block,
    /// 立即返回 QueueFull
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 队列最大容量
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    /// 阻塞模式下等待空位的超时时间（毫秒，0表示无限等待）
    pub enqueue_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            overflow: OverflowPolicy::Block,
            enqueue_timeout_ms: 0,
        }
    }
}

impl ConfigValidator for QueueConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(self.capacity, "queue.capacity", 1_000_000)?;
        Ok(())
    }
}
