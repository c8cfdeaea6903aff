use serde::{Deserialize, Serialize};
use thiserror::Error;


/// 投递失败的分类。
///
/// 只有 `Transient` 会在本地重试；`Permanent` 直接进入死信；
/// 其余三类由调度器本身产生，不代表下游失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    CircuitOpen,
    QueueClosed,
    Undelivered,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::QueueClosed => "queue_closed",
            ErrorKind::Undelivered => "undelivered",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("临时性投递失败: {0}")]
    Transient(String),
    #[error("永久性投递失败: {0}")]
    Permanent(String),
    #[error("熔断器已打开: {target}")]
    CircuitOpen { target: String },
    #[error("队列已关闭")]
    QueueClosed,
    #[error("队列已满: 容量 {capacity}")]
    QueueFull { capacity: usize },
    #[error("关闭截止时间到达时仍未投递: {sequence_id}")]
    Undelivered { sequence_id: u64 },
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type CourierResult<T> = Result<T, CourierError>;

impl CourierError {
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Self::Transient(msg.into())
    }
    pub fn permanent<S: Into<String>>(msg: S) -> Self {
        Self::Permanent(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn circuit_open<S: Into<String>>(target: S) -> Self {
        Self::CircuitOpen {
            target: target.into(),
        }
    }

    /// Classify an HTTP status returned by a downstream target.
    ///
    /// Returns `None` for 2xx. 408, 429 and 5xx are transient; every other
    /// status is permanent.
    pub fn from_status(status: u16, body: &str) -> Option<Self> {
        if (200..300).contains(&status) {
            return None;
        }
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status} - {body}")
        };
        if status == 408 || status == 429 || (500..600).contains(&status) {
            Some(Self::Transient(message))
        } else {
            Some(Self::Permanent(message))
        }
    }

    /// 把错误映射到投递分类。发送层自身的错误（序列化、内部错误）
    /// 只对当前条目致命，因此按永久性处理。
    pub fn kind(&self) -> ErrorKind {
        match self {
            CourierError::Transient(_) => ErrorKind::Transient,
            CourierError::Permanent(_)
            | CourierError::Serialization(_)
            | CourierError::Internal(_)
            | CourierError::Configuration(_) => ErrorKind::Permanent,
            CourierError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            CourierError::QueueClosed | CourierError::QueueFull { .. } => ErrorKind::QueueClosed,
            CourierError::Undelivered { .. } => ErrorKind::Undelivered,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for CourierError {
    fn from(err: anyhow::Error) -> Self {
        CourierError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for CourierError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if let Some(classified) = CourierError::from_status(status.as_u16(), "") {
                return classified;
            }
        }
        if err.is_builder() || err.is_redirect() {
            CourierError::Permanent(err.to_string())
        } else {
            // timeout / connect / connection reset / truncated body
            CourierError::Transient(err.to_string())
        }
    }
}
