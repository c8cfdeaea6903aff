//! 死信 sink 实现
//!
//! `accept` 不返回错误：死信写入失败只记录日志和指标，不能反过来阻塞投递。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use metrics::counter;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

use courier_domain::{DeadLetter, DeadLetterSink};
use courier_errors::{CourierError, CourierResult};

/// 只输出一条 warn 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn accept(&self, dead_letter: DeadLetter) {
        warn!(
            sequence_id = dead_letter.sequence_id(),
            final_error = %dead_letter.final_error,
            total_attempts = dead_letter.total_attempts,
            reason = %dead_letter.reason,
            "Item dead-lettered"
        );
    }
}

/// 有界通道 sink，满了直接丢弃而不是等待
#[derive(Debug)]
pub struct ChannelDeadLetterSink {
    tx: mpsc::Sender<DeadLetter>,
    dropped: AtomicU64,
}

impl ChannelDeadLetterSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<DeadLetter>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// 因通道已满或接收端关闭而丢弃的死信数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeadLetterSink for ChannelDeadLetterSink {
    async fn accept(&self, dead_letter: DeadLetter) {
        if let Err(e) = self.tx.try_send(dead_letter) {
            let sequence_id = match &e {
                mpsc::error::TrySendError::Full(dl) | mpsc::error::TrySendError::Closed(dl) => {
                    dl.sequence_id()
                }
            };
            self.dropped.fetch_add(1, Ordering::Relaxed);
            counter!("courier_dead_letters_dropped_total").increment(1);
            error!(sequence_id, "Dead letter dropped: {}", e);
        }
    }
}

/// 以 JSON Lines 格式追加写入文件
#[derive(Debug)]
pub struct JsonlDeadLetterSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JsonlDeadLetterSink {
    pub async fn open(path: impl AsRef<Path>) -> CourierResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                CourierError::config_error(format!("无法打开死信文件 {}: {e}", path.display()))
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeadLetterSink for JsonlDeadLetterSink {
    async fn accept(&self, dead_letter: DeadLetter) {
        let sequence_id = dead_letter.sequence_id();
        let mut line = match serde_json::to_vec(&dead_letter) {
            Ok(line) => line,
            Err(e) => {
                error!(sequence_id, "Failed to serialize dead letter: {}", e);
                counter!("courier_dead_letters_dropped_total").increment(1);
                return;
            }
        };
        line.push(b'\n');

        let mut file = self.file.lock().await;
        let result = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            error!(
                sequence_id,
                "Failed to append dead letter to {}: {}",
                self.path.display(),
                e
            );
            counter!("courier_dead_letters_dropped_total").increment(1);
        }
    }
}
