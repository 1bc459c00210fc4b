use crate::config::AppConfig;
use crate::error::StreamError;
use crate::stream::{InboundMessage, MessageSource, PAYLOAD_FIELD};
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadReply};
use std::collections::VecDeque;

/// Consumer-group reader over a Redis stream.
///
/// On start it first walks entries already delivered to this consumer but
/// never acknowledged, then switches to new entries (id `>`).
pub struct RedisStreamSource {
    conn: MultiplexedConnection,
    stream_key: String,
    group: String,
    consumer: String,
    block_ms: u64,
    read_count: usize,
    replaying_pending: bool,
    pending_cursor: String,
    buffered: VecDeque<InboundMessage>,
}

impl RedisStreamSource {
    pub async fn connect(client: &redis::Client, cfg: &AppConfig) -> Result<Self, StreamError> {
        let conn = client.get_multiplexed_async_connection().await?;
        let mut source = Self {
            conn,
            stream_key: cfg.stream_key.clone(),
            group: cfg.stream_group.clone(),
            consumer: cfg.consumer_name.clone(),
            block_ms: cfg.poll_block_ms,
            read_count: cfg.read_count,
            replaying_pending: true,
            pending_cursor: "0".to_string(),
            buffered: VecDeque::new(),
        };
        source.ensure_group().await?;
        Ok(source)
    }

    async fn ensure_group(&mut self) -> Result<(), StreamError> {
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.conn)
            .await;

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_batch(&mut self) -> Result<(), StreamError> {
        let start_id = if self.replaying_pending {
            self.pending_cursor.clone()
        } else {
            ">".to_string()
        };
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(self.read_count)
            .arg("BLOCK")
            .arg(self.block_ms)
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(start_id)
            .query_async(&mut self.conn)
            .await?;

        let entries: Vec<_> = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();

        if self.replaying_pending && entries.is_empty() {
            tracing::info!(consumer = %self.consumer, "pending entries replayed, reading new messages");
            self.replaying_pending = false;
            return Ok(());
        }

        if self.replaying_pending {
            if let Some(last) = entries.last() {
                self.pending_cursor = last.id.clone();
            }
        }

        for entry in entries {
            match classify_entry(entry, self.replaying_pending)? {
                Entry::Message(message) => self.buffered.push_back(message),
                Entry::Trimmed(id) => {
                    tracing::warn!(id = %id, "pending entry no longer in stream, acknowledging");
                    self.ack(&id).await?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Entry {
    Message(InboundMessage),
    /// A pending entry whose body was trimmed from the stream.
    Trimmed(String),
}

fn classify_entry(entry: StreamId, replaying_pending: bool) -> Result<Entry, StreamError> {
    let payload = entry
        .map
        .get(PAYLOAD_FIELD)
        .and_then(|v| redis::from_redis_value::<String>(v).ok());

    match payload {
        Some(payload) => Ok(Entry::Message(InboundMessage { id: entry.id, payload })),
        None if replaying_pending && entry.map.is_empty() => Ok(Entry::Trimmed(entry.id)),
        None => Err(StreamError::MissingPayload {
            id: entry.id,
            field: PAYLOAD_FIELD,
        }),
    }
}

#[async_trait::async_trait]
impl MessageSource for RedisStreamSource {
    async fn poll(&mut self) -> Result<Option<InboundMessage>, StreamError> {
        if self.buffered.is_empty() {
            self.read_batch().await?;
        }
        Ok(self.buffered.pop_front())
    }

    async fn ack(&mut self, id: &str) -> Result<(), StreamError> {
        let _: i64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(id)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }
}
