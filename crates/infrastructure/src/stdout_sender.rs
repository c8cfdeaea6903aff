use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use courier_domain::{SendResponse, Sender};
use courier_errors::{CourierError, CourierResult};

/// 把每个负载写成一行输出，用于本地调试
pub struct StdoutSender {
    target: String,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl StdoutSender {
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_writer(target, tokio::io::stdout())
    }

    pub fn with_writer<W>(target: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            target: target.into(),
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

#[async_trait]
impl Sender for StdoutSender {
    fn target(&self) -> &str {
        &self.target
    }

    async fn send(&self, payload: &[u8]) -> CourierResult<SendResponse> {
        let mut writer = self.writer.lock().await;

        // 写失败（例如管道关闭）通常可恢复，按临时性错误处理
        let write = async {
            writer.write_all(payload).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        write
            .await
            .map_err(|e| CourierError::transient(format!("写入输出失败: {e}")))?;

        Ok(SendResponse::ok())
    }
}
