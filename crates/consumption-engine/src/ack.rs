use crate::AckResult;
use async_trait::async_trait;

/// Delivers an acknowledgment for a processed message to the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Send `report`, the JSON encoding of the message id.
    async fn acknowledge(&self, report: String) -> AckResult<()>;
}
