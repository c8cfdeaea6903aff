use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use courier::{Application, InputSource};
use courier_config::{AppConfig, DeadLetterKind};
use courier_domain::DeadLetter;
use courier_errors::ErrorKind;
use courier_testing_utils::ScriptedSender;
use tokio::sync::broadcast;

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.dispatcher.workers = 2;
    config.retry.base_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.circuit_breaker.failure_threshold = 1.0;
    config.shutdown.deadline_ms = 5_000;
    config
}

#[tokio::test]
async fn test_file_input_is_delivered() -> Result<()> {
    let mut input = tempfile::NamedTempFile::new()?;
    for i in 1..=25 {
        writeln!(input, "{{\"event\":{i}}}")?;
    }
    input.flush()?;

    let sender = ScriptedSender::fail_first(1);
    let app = Application::with_sender(fast_config(), Arc::new(sender.clone())).await?;

    let source = InputSource::File(input.path().to_path_buf());
    let (_tx, rx) = broadcast::channel(1);
    let summary = app.run(source.open().await?, rx).await?;

    assert_eq!(summary.enqueued, 25);
    assert!(summary.report.drained);
    assert_eq!(summary.report.stats.acked, 25);
    assert_eq!(sender.call_count(), 50);

    Ok(())
}

#[tokio::test]
async fn test_permanent_failures_are_appended_to_jsonl_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dead-letters.jsonl");

    let mut config = fast_config();
    config.dispatcher.workers = 1;
    config.dead_letter.kind = DeadLetterKind::Jsonl;
    config.dead_letter.path = Some(path.to_string_lossy().into_owned());

    let sender = ScriptedSender::new(|payload, _| {
        if payload.starts_with(b"bad") {
            Err(courier_errors::CourierError::permanent("HTTP 422"))
        } else {
            Ok(courier_domain::SendResponse::ok())
        }
    });
    let app = Application::with_sender(config, Arc::new(sender)).await?;

    let input: &[u8] = b"good-1\nbad-1\ngood-2\nbad-2\n";
    let (_tx, rx) = broadcast::channel(1);
    let summary = app.run(input, rx).await?;

    assert_eq!(summary.report.stats.acked, 2);
    assert_eq!(summary.report.stats.dead_lettered, 2);

    let contents = tokio::fs::read_to_string(&path).await?;
    let dead_letters: Vec<DeadLetter> = contents
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;

    assert_eq!(dead_letters.len(), 2);
    assert_eq!(dead_letters[0].item.payload(), b"bad-1");
    assert_eq!(dead_letters[1].item.payload(), b"bad-2");
    for dead_letter in &dead_letters {
        assert_eq!(dead_letter.final_error, ErrorKind::Permanent);
        assert_eq!(dead_letter.total_attempts, 1);
    }

    Ok(())
}

#[tokio::test]
async fn test_zero_deadline_reports_backlog_undelivered() -> Result<()> {
    let mut config = fast_config();
    config.dispatcher.workers = 1;
    config.shutdown.deadline_ms = 0;

    // 每次调用都很慢，截止时间到达时队列中仍有积压
    let sender = ScriptedSender::always_ok().with_latency(Duration::from_millis(200));
    let app = Application::with_sender(config, Arc::new(sender.clone())).await?;

    let input: &[u8] = b"a\nb\nc\nd\ne\n";
    let (_tx, rx) = broadcast::channel(1);
    let summary = app.run(input, rx).await?;

    let stats = summary.report.stats;
    assert_eq!(stats.total(), 5);
    assert!(!summary.report.undelivered.is_empty());
    assert!(stats.acked <= 1);
    assert_eq!(stats.undelivered as usize, summary.report.undelivered.len());

    Ok(())
}
