use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::{debug, warn};

use courier_config::SenderConfig;
use courier_domain::{SendResponse, Sender};
use courier_errors::{CourierError, CourierResult};

/// POSTs each payload to a fixed HTTP endpoint.
///
/// Status classification follows [`CourierError::from_status`]; transport
/// failures (timeouts, refused connections, resets) are transient.
pub struct HttpSender {
    target: String,
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpSender {
    pub fn new(config: &SenderConfig) -> CourierResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&config.content_type).map_err(|e| {
                CourierError::config_error(format!(
                    "无效的 content_type {}: {e}",
                    config.content_type
                ))
            })?,
        );
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CourierError::config_error(format!("无效的请求头名称 {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CourierError::config_error(format!("无效的请求头值 {name}: {e}")))?;
            headers.insert(name, value);
        }

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .connect_timeout(config.request_timeout().min(Duration::from_secs(5)))
            .build()
            .map_err(|e| CourierError::config_error(format!("无法创建 HTTP 客户端: {e}")))?;

        Ok(Self {
            target: config.target.clone(),
            endpoint: config.endpoint.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl Sender for HttpSender {
    fn target(&self) -> &str {
        &self.target
    }

    async fn send(&self, payload: &[u8]) -> CourierResult<SendResponse> {
        let response = match self
            .http_client
            .post(&self.endpoint)
            .body(payload.to_vec())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to reach {}: {}", self.endpoint, e);
                return Err(CourierError::from(e));
            }
        };

        let status = response.status().as_u16();
        // 状态码已经决定分类，读取响应体失败只记录
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    downstream = %self.target,
                    status,
                    "Failed to read response body from {}: {}",
                    self.endpoint,
                    e
                );
                String::new()
            }
        };

        match CourierError::from_status(status, &body) {
            None => {
                debug!("Delivered {} bytes to {} (HTTP {})", payload.len(), self.target, status);
                Ok(SendResponse { status, body })
            }
            Some(err) => {
                warn!("Delivery to {} rejected: HTTP {} - {}", self.target, status, body);
                Err(err)
            }
        }
    }
}
