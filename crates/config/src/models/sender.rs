use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::ConfigError;

/// 下游发送实现，在配置阶段一次性选定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    Http,
    Stdout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    pub kind: SenderKind,
    /// 下游目标名，每个目标共享一个熔断器
    pub target: String,
    pub endpoint: String,
    pub content_type: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub request_timeout_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            kind: SenderKind::Http,
            target: "default".to_string(),
            endpoint: "http://127.0.0.1:8080/ingest".to_string(),
            content_type: "application/octet-stream".to_string(),
            headers: HashMap::new(),
            request_timeout_ms: 10_000,
        }
    }
}

impl SenderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ConfigValidator for SenderConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.target, "sender.target")?;

        if self.kind == SenderKind::Http {
            ValidationUtils::validate_http_url(&self.endpoint, "sender.endpoint")?;
            ValidationUtils::validate_not_empty(&self.content_type, "sender.content_type")?;
            ValidationUtils::validate_positive_millis(
                self.request_timeout_ms,
                "sender.request_timeout_ms",
            )?;
        }

        for name in self.headers.keys() {
            ValidationUtils::validate_not_empty(name, "sender.headers name")?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterKind {
    /// 只写日志
    Log,
    /// 追加写入 JSON Lines 文件
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterConfig {
    pub kind: DeadLetterKind,
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            kind: DeadLetterKind::Log,
            path: None,
        }
    }
}

impl ConfigValidator for DeadLetterConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.kind == DeadLetterKind::Jsonl {
            match &self.path {
                Some(path) => ValidationUtils::validate_not_empty(path, "dead_letter.path")?,
                None => {
                    return Err(ConfigError::Validation(
                        "dead_letter.path is required when dead_letter.kind = \"jsonl\"".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }
}
