use crate::error::{DeadLetterError, StreamError};

pub mod dead_letter;
pub mod memory;
pub mod redis_source;

/// Stream entry field carrying the JSON transaction payload.
pub const PAYLOAD_FIELD: &str = "payload";
/// Dead-letter entry field naming why the payload was rejected.
pub const ERROR_FIELD: &str = "error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Transport-assigned id, used for acknowledgement.
    pub id: String,
    /// Raw payload exactly as received.
    pub payload: String,
}

#[async_trait::async_trait]
pub trait MessageSource: Send {
    /// Waits a bounded time for the next message. `Ok(None)` means nothing
    /// arrived; errors are transport failures.
    async fn poll(&mut self) -> Result<Option<InboundMessage>, StreamError>;

    async fn ack(&mut self, id: &str) -> Result<(), StreamError>;
}

#[async_trait::async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Publishes `raw` unmodified and returns once delivery is confirmed.
    async fn send(&self, raw: &str, reason: &str) -> Result<(), DeadLetterError>;
}
