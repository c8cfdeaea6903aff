use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    dispatcher::{DispatcherConfig, RetryConfig, ShutdownConfig},
    observability::ObservabilityConfig,
    queue::QueueConfig,
    sender::{DeadLetterConfig, SenderConfig},
};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::validation::ConfigValidator;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub dispatcher: DispatcherConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub sender: SenderConfig,
    pub dead_letter: DeadLetterConfig,
    pub shutdown: ShutdownConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：内置默认值 < TOML 文件 < `COURIER_*` 环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults =
            ConfigBuilder::try_from(&AppConfig::default()).context("生成默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/courier.toml",
                "courier.toml",
                "/etc/courier/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("COURIER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.queue.validate()?;
        self.dispatcher.validate()?;
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.sender.validate()?;
        self.dead_letter.validate()?;
        self.shutdown.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OverflowPolicy, SenderKind};
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatcher.workers, 1);
        assert_eq!(config.queue.capacity, 1024);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();

        assert_eq!(parsed.queue.capacity, config.queue.capacity);
        assert_eq!(parsed.retry.base_delay, config.retry.base_delay);
        assert_eq!(parsed.circuit_breaker.cooldown, config.circuit_breaker.cooldown);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        let mut config = AppConfig::default();
        config.dispatcher.workers = 0;
        let toml_str = config.to_toml().unwrap();
        assert!(AppConfig::from_toml(&toml_str).is_err());
    }

    #[test]
    fn test_load_partial_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[queue]
capacity = 16
overflow = "reject"

[dispatcher]
workers = 4

[retry]
max_attempts = 3
base_delay_ms = 20

[sender]
kind = "stdout"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();

        assert_eq!(config.queue.capacity, 16);
        assert_eq!(config.queue.overflow, OverflowPolicy::Reject);
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(20));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
        assert_eq!(config.sender.kind, SenderKind::Stdout);
        assert_eq!(config.circuit_breaker.window_size, 20);
    }

    #[test]
    fn test_sample_config_file_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/courier.toml");
        let config = AppConfig::load(Some(path)).unwrap();

        assert_eq!(config.dead_letter.kind, crate::DeadLetterKind::Jsonl);
        assert_eq!(config.sender.headers.get("x-source").map(String::as_str), Some("courier"));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = AppConfig::load(Some("/definitely/not/here/courier.toml"));
        assert!(result.is_err());
    }
}
