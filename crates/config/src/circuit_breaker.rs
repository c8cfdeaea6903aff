use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// 滑动窗口熔断配置。
///
/// 窗口内失败比例严格大于 `failure_threshold` 时打开；
/// 窗口样本数少于 `minimum_calls` 时不做判断。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub window_size: usize,
    pub failure_threshold: f64,
    pub minimum_calls: usize,
    #[serde(rename = "cooldown_ms", with = "crate::duration_ms")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            failure_threshold: 0.5,
            minimum_calls: 20,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl ConfigValidator for CircuitBreakerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_count(self.window_size, "circuit_breaker.window_size", 10_000)?;
        ValidationUtils::validate_ratio(self.failure_threshold, "circuit_breaker.failure_threshold")?;

        if self.minimum_calls == 0 || self.minimum_calls > self.window_size {
            return Err(ConfigError::Validation(format!(
                "circuit_breaker.minimum_calls must be within 1..={}",
                self.window_size
            )));
        }

        if self.cooldown.is_zero() {
            return Err(ConfigError::Validation(
                "circuit_breaker.cooldown_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
