use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// 并发消费者数量。只有为1时才保证全局 FIFO 完成顺序
    pub workers: usize,
    /// 熔断打开时，条目放回队首前的等待时间（毫秒）
    pub circuit_open_delay_ms: u64,
    /// 单次死信投递的最长等待时间（毫秒）
    pub dead_letter_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            circuit_open_delay_ms: 250,
            dead_letter_timeout_ms: 1000,
        }
    }
}

impl DispatcherConfig {
    pub fn circuit_open_delay(&self) -> Duration {
        Duration::from_millis(self.circuit_open_delay_ms)
    }

    pub fn dead_letter_timeout(&self) -> Duration {
        Duration::from_millis(self.dead_letter_timeout_ms)
    }
}

impl ConfigValidator for DispatcherConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(self.workers, "dispatcher.workers", 1024)?;
        ValidationUtils::validate_positive_millis(
            self.circuit_open_delay_ms,
            "dispatcher.circuit_open_delay_ms",
        )?;
        ValidationUtils::validate_positive_millis(
            self.dead_letter_timeout_ms,
            "dispatcher.dead_letter_timeout_ms",
        )?;
        Ok(())
    }
}

/// 重试策略配置
///
/// `delay = min(max_delay, base_delay * 2^attempt) * U(0.5, 1.0)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 包含首次尝试在内的最大尝试次数
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "crate::duration_ms")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "crate::duration_ms")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ConfigValidator for RetryConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.base_delay.is_zero() {
            return Err(ConfigError::Validation(
                "retry.base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::Validation(
                "retry.base_delay_ms must be less than or equal to retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅关闭的排空截止时间（毫秒）
    pub deadline_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { deadline_ms: 30_000 }
    }
}

impl ShutdownConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl ConfigValidator for ShutdownConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_validation() {
        let config = DispatcherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.circuit_open_delay(), Duration::from_millis(250));

        let mut invalid = config.clone();
        invalid.workers = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.workers = 2048;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.dead_letter_timeout_ms = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_retry_config_validation() {
        let config = RetryConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.max_attempts = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.base_delay = Duration::from_secs(20);
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.base_delay = Duration::ZERO;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_retry_config_millis_fields() {
        let config: RetryConfig =
            toml::from_str("max_attempts = 3\nbase_delay_ms = 50\nmax_delay_ms = 2000\n").unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(50));
        assert_eq!(config.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_shutdown_deadline_may_be_zero() {
        let config = ShutdownConfig { deadline_ms: 0 };
        assert!(config.validate().is_ok());
        assert_eq!(config.deadline(), Duration::ZERO);
    }
}
