use std::sync::Arc;

use tracing::{debug, info};

use courier_config::{DeadLetterConfig, DeadLetterKind, SenderConfig, SenderKind};
use courier_domain::{DeadLetterSink, Sender};
use courier_errors::{CourierError, CourierResult};

use crate::dead_letter::{JsonlDeadLetterSink, LoggingDeadLetterSink};
use crate::{HttpSender, StdoutSender};

pub struct SenderFactory;

impl SenderFactory {
    pub fn create(config: &SenderConfig) -> CourierResult<Arc<dyn Sender>> {
        debug!("Creating sender with kind: {:?}", config.kind);

        match config.kind {
            SenderKind::Http => {
                info!("Initializing HTTP sender for {}", config.endpoint);
                Ok(Arc::new(HttpSender::new(config)?))
            }
            SenderKind::Stdout => {
                info!("Initializing stdout sender");
                Ok(Arc::new(StdoutSender::new(config.target.clone())))
            }
        }
    }

    pub async fn create_dead_letter_sink(
        config: &DeadLetterConfig,
    ) -> CourierResult<Arc<dyn DeadLetterSink>> {
        match config.kind {
            DeadLetterKind::Log => Ok(Arc::new(LoggingDeadLetterSink)),
            DeadLetterKind::Jsonl => {
                let path = config.path.as_deref().ok_or_else(|| {
                    CourierError::config_error("dead_letter.path 在 jsonl 模式下必须设置")
                })?;
                info!("Dead letters will be appended to {}", path);
                Ok(Arc::new(JsonlDeadLetterSink::open(path).await?))
            }
        }
    }
}

/// Shorthand for [`SenderFactory::create`]
pub fn create_sender(config: &SenderConfig) -> CourierResult<Arc<dyn Sender>> {
    SenderFactory::create(config)
}
