//! In-process stream and dead-letter channel for tests and local runs.

use crate::error::{DeadLetterError, StreamError};
use crate::stream::{DeadLetterSink, InboundMessage, MessageSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

enum Polled {
    Message(InboundMessage),
    TransportError(String),
}

pub struct InMemorySource {
    queue: VecDeque<Polled>,
    next_id: u64,
    idle_wait: Duration,
    acked: Arc<Mutex<Vec<String>>>,
    cancel_when_drained: Option<CancellationToken>,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            next_id: 1,
            idle_wait: Duration::from_millis(5),
            acked: Arc::new(Mutex::new(Vec::new())),
            cancel_when_drained: None,
        }
    }
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_payloads<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut source = Self::new();
        for payload in payloads {
            source.push(payload);
        }
        source
    }

    /// Queues a payload and returns the id it will be delivered with.
    pub fn push(&mut self, payload: impl Into<String>) -> String {
        let id = format!("{}-0", self.next_id);
        self.next_id += 1;
        self.queue.push_back(Polled::Message(InboundMessage {
            id: id.clone(),
            payload: payload.into(),
        }));
        id
    }

    pub fn push_transport_error(&mut self, reason: impl Into<String>) {
        self.queue.push_back(Polled::TransportError(reason.into()));
    }

    /// Cancels `token` the first time a poll finds the queue empty.
    pub fn cancel_when_drained(mut self, token: CancellationToken) -> Self {
        self.cancel_when_drained = Some(token);
        self
    }

    /// Shared view of acknowledged ids, usable after the source is moved.
    pub fn ack_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.acked.clone()
    }
}

#[async_trait::async_trait]
impl MessageSource for InMemorySource {
    async fn poll(&mut self) -> Result<Option<InboundMessage>, StreamError> {
        match self.queue.pop_front() {
            Some(Polled::Message(m)) => Ok(Some(m)),
            Some(Polled::TransportError(reason)) => Err(StreamError::Transport(reason)),
            None => {
                if let Some(token) = &self.cancel_when_drained {
                    token.cancel();
                }
                tokio::time::sleep(self.idle_wait).await;
                Ok(None)
            }
        }
    }

    async fn ack(&mut self, id: &str) -> Result<(), StreamError> {
        self.acked.lock().await.push(id.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub payload: String,
    pub reason: String,
}

#[derive(Clone, Default)]
pub struct InMemoryDeadLetters {
    entries: Arc<Mutex<Vec<DeadLetter>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<DeadLetter> {
        self.entries.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl DeadLetterSink for InMemoryDeadLetters {
    async fn send(&self, raw: &str, reason: &str) -> Result<(), DeadLetterError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeadLetterError {
                stream: "memory_dlq".to_string(),
                reason: "sink marked failing".to_string(),
            });
        }
        self.entries.lock().await.push(DeadLetter {
            payload: raw.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}
