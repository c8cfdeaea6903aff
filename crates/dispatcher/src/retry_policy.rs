use std::time::Duration;

use courier_config::RetryConfig;
use courier_errors::ErrorKind;

/// 重试策略：决定是否重试，以及下一次重试前的等待时间
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `attempts` 为已经完成的尝试次数（包含刚刚失败的这一次）。
    /// 只有临时性错误且预算未用完时才重试。
    pub fn should_retry(&self, kind: ErrorKind, attempts: u32) -> bool {
        kind.is_retryable() && attempts < self.max_attempts
    }

    /// 不含抖动的退避上限：`min(max_delay, base_delay * 2^attempt)`
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// 计算第 `attempt` 次重试（从0开始）前的等待时间，抖动范围 [0.5, 1.0)
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let jitter = 0.5 + rand::random::<f64>() * 0.5;
        self.backoff_ceiling(attempt).mul_f64(jitter)
    }
}
