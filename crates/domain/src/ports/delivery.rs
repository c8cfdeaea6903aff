use async_trait::async_trait;
use courier_errors::CourierResult;

/// 下游目标对一次成功投递的应答
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    pub status: u16,
    pub body: String,
}

impl SendResponse {
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: String::new(),
        }
    }
}

/// Interface for delivering one payload to a downstream target.
///
/// Implementations classify failures themselves: `CourierError::Transient`
/// for anything worth retrying, `CourierError::Permanent` otherwise.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Name of the downstream target; one circuit breaker is kept per target.
    fn target(&self) -> &str;

    async fn send(&self, payload: &[u8]) -> CourierResult<SendResponse>;
}
