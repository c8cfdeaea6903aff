use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use courier::{Application, InputSource, ShutdownManager};
use courier_config::AppConfig;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("courier")
        .version("1.0.0")
        .about("有序、可靠的 HTTP 投递管道")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，不指定时按默认路径查找"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("负载文件，每行一个负载；省略或为 - 时读取标准输入"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .help("worker 数量，覆盖配置文件")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("endpoint")
                .short('e')
                .long("endpoint")
                .value_name("URL")
                .help("下游 HTTP 端点，覆盖配置文件"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");

    // 加载配置
    let mut config = AppConfig::load(config_path.map(String::as_str))
        .context("加载配置失败")?;

    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.dispatcher.workers = *workers;
    }
    if let Some(endpoint) = matches.get_one::<String>("endpoint") {
        config.sender.endpoint = endpoint.clone();
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    // 初始化日志系统
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    if config.observability.metrics_enabled {
        init_metrics(&config.observability.metrics_bind)?;
    }

    info!("启动 courier");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let input = InputSource::from_arg(matches.get_one::<String>("input").map(String::as_str));
    let reader = input.open().await?;

    let app = Application::new(config).await?;

    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;
    let signals = tokio::spawn({
        let shutdown_manager = shutdown_manager.clone();
        async move { shutdown_manager.listen_for_signals().await }
    });

    let summary = app.run(reader, shutdown_rx).await;
    signals.abort();

    match summary {
        Ok(summary) => {
            if summary.interrupted {
                warn!("输入在读取完成前被中断");
            }
            info!(
                enqueued = summary.enqueued,
                acked = summary.report.stats.acked,
                dead_lettered = summary.report.stats.dead_lettered,
                undelivered = summary.report.undelivered.len(),
                "courier 已退出"
            );
            Ok(())
        }
        Err(e) => {
            error!("应用运行失败: {e:#}");
            Err(e)
        }
    }
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 标准输出可能被 stdout 发送器占用，日志统一写到标准错误
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 启动 Prometheus 指标导出
fn init_metrics(bind: &str) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind}"))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("安装 Prometheus 导出器失败: {}", e))?;

    info!("Prometheus 指标导出已启动: {addr}");
    Ok(())
}
