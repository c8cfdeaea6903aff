use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use courier_config::AppConfig;
use courier_dispatcher::{Dispatcher, ShutdownReport};
use courier_domain::Sender;
use courier_errors::CourierError;
use courier_infrastructure::{create_sender, CircuitBreakerRegistry, SenderFactory};

/// 负载来源：每行一个负载，空行跳过
#[derive(Debug, Clone)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("-") => InputSource::Stdin,
            Some(path) => InputSource::File(PathBuf::from(path)),
        }
    }

    pub async fn open(&self) -> Result<Box<dyn AsyncBufRead + Send + Unpin>> {
        match self {
            InputSource::Stdin => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
            InputSource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("打开输入文件失败: {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

/// 一次运行的汇总
#[derive(Debug)]
pub struct RunSummary {
    pub enqueued: u64,
    pub interrupted: bool,
    pub report: ShutdownReport,
}

/// 主应用程序：把输入流接到调度器上
pub struct Application {
    config: AppConfig,
    dispatcher: Arc<Dispatcher>,
    breakers: CircuitBreakerRegistry,
}

impl Application {
    /// 按配置创建发送器、死信接收器和调度器
    pub async fn new(config: AppConfig) -> Result<Self> {
        let sender = create_sender(&config.sender).context("创建发送器失败")?;
        Self::with_sender(config, sender).await
    }

    pub async fn with_sender(config: AppConfig, sender: Arc<dyn Sender>) -> Result<Self> {
        info!(
            workers = config.dispatcher.workers,
            downstream = sender.target(),
            "初始化应用程序"
        );

        let dead_letters = SenderFactory::create_dead_letter_sink(&config.dead_letter)
            .await
            .context("创建死信接收器失败")?;

        let breakers = CircuitBreakerRegistry::new(config.circuit_breaker.clone());
        let breaker = breakers.get_or_create(sender.target()).await;

        let dispatcher = Dispatcher::builder(sender)
            .with_app_config(&config)
            .circuit_breaker(breaker)
            .dead_letter_sink(dead_letters)
            .build()
            .context("创建调度器失败")?;

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            breakers,
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// 读取输入直到结束或收到关闭信号，然后在截止时间内停止调度器
    pub async fn run<R>(
        &self,
        input: R,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<RunSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        self.dispatcher.start().await.context("启动调度器失败")?;

        let mut lines = input.lines();
        let mut enqueued = 0u64;
        let mut interrupted = false;

        loop {
            let line = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止读取输入");
                    interrupted = true;
                    break;
                }
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("输入结束");
                    break;
                }
                Err(e) => {
                    error!("读取输入失败: {e}");
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            // 入队可能因背压阻塞，同样需要响应关闭信号
            let result = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止读取输入");
                    interrupted = true;
                    break;
                }
                result = self.dispatcher.enqueue(line.into_bytes()) => result,
            };

            match result {
                Ok(sequence_id) => {
                    enqueued += 1;
                    debug!(sequence_id, "负载已入队");
                }
                Err(CourierError::QueueClosed) => {
                    warn!("队列已关闭，停止读取输入");
                    break;
                }
                Err(e) => {
                    warn!("负载入队失败: {e}");
                }
            }
        }

        let report = self.dispatcher.stop(self.config.shutdown.deadline()).await;
        self.log_summary(enqueued, &report).await;

        Ok(RunSummary {
            enqueued,
            interrupted,
            report,
        })
    }

    async fn log_summary(&self, enqueued: u64, report: &ShutdownReport) {
        info!(
            enqueued,
            acked = report.stats.acked,
            dead_lettered = report.stats.dead_lettered,
            undelivered = report.stats.undelivered,
            cancelled = report.stats.cancelled,
            drained = report.drained,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "投递完成"
        );

        for target in self.breakers.targets().await {
            if let Some(breaker) = self.breakers.get(&target).await {
                let stats = breaker.stats().await;
                info!(
                    downstream = %target,
                    state = ?stats.state,
                    failures = stats.total_failures,
                    rejected = stats.rejected_calls,
                    "熔断器状态"
                );
            }
        }

        if !report.undelivered.is_empty() {
            warn!(
                count = report.undelivered.len(),
                "截止时间到达时仍有未投递的条目: {:?}",
                report.undelivered
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_testing_utils::ScriptedSender;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.dispatcher.workers = 1;
        config.retry.base_delay = Duration::from_millis(1);
        config.retry.max_delay = Duration::from_millis(5);
        config.shutdown.deadline_ms = 5_000;
        config
    }

    #[tokio::test]
    async fn test_run_delivers_every_non_empty_line_in_order() {
        let sender = ScriptedSender::always_ok();
        let app = Application::with_sender(test_config(), Arc::new(sender.clone()))
            .await
            .unwrap();
        let (_tx, rx) = broadcast::channel(1);

        let input: &[u8] = b"first\n\nsecond\n   \nthird\n";
        let summary = app.run(input, rx).await.unwrap();

        assert_eq!(summary.enqueued, 3);
        assert!(!summary.interrupted);
        assert!(summary.report.drained);
        assert_eq!(summary.report.stats.acked, 3);
        assert_eq!(
            sender.calls(),
            vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal_interrupts_open_input() {
        let sender = ScriptedSender::always_ok();
        let app = Application::with_sender(test_config(), Arc::new(sender.clone()))
            .await
            .unwrap();
        let (tx, rx) = broadcast::channel(1);

        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"one\ntwo\n").await.unwrap();

        let app = Arc::new(app);
        let run = tokio::spawn({
            let app = Arc::clone(&app);
            async move { app.run(BufReader::new(reader), rx).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.enqueued, 2);
        assert_eq!(summary.report.stats.acked, 2);
        drop(writer);
    }

    #[tokio::test]
    async fn test_missing_input_file_is_an_error() {
        let source = InputSource::from_arg(Some("/definitely/not/here.txt"));
        assert!(source.open().await.is_err());
        assert!(matches!(InputSource::from_arg(Some("-")), InputSource::Stdin));
        assert!(matches!(InputSource::from_arg(None), InputSource::Stdin));
    }

    #[tokio::test]
    async fn test_jsonl_dead_letter_config_without_path_fails() {
        let mut config = test_config();
        config.dead_letter.kind = courier_config::DeadLetterKind::Jsonl;
        config.dead_letter.path = None;

        let result = Application::with_sender(config, Arc::new(ScriptedSender::always_ok())).await;
        assert!(result.is_err());
    }
}
