use crate::error::{DeadLetterError, StreamError};
use crate::stream::{DeadLetterSink, ERROR_FIELD, PAYLOAD_FIELD};
use redis::aio::MultiplexedConnection;

/// Writes rejected payloads to the `<stream>_dlq` stream.
#[derive(Clone)]
pub struct RedisDeadLetterSink {
    conn: MultiplexedConnection,
    stream: String,
}

impl RedisDeadLetterSink {
    pub async fn connect(client: &redis::Client, stream: String) -> Result<Self, StreamError> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn, stream })
    }
}

#[async_trait::async_trait]
impl DeadLetterSink for RedisDeadLetterSink {
    async fn send(&self, raw: &str, reason: &str) -> Result<(), DeadLetterError> {
        let mut conn = self.conn.clone();
        // XADD replies with the new entry id once the write is applied
        let entry_id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(raw)
            .arg(ERROR_FIELD)
            .arg(reason)
            .query_async(&mut conn)
            .await
            .map_err(|e| DeadLetterError {
                stream: self.stream.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(stream = %self.stream, entry_id = %entry_id, "dead-lettered message");
        Ok(())
    }
}
