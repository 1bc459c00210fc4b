use crate::error::StreamError;
use crate::repo::store::ScoredTransactionStore;
use crate::service::scoring_service::ScoringService;
use crate::stream::{DeadLetterSink, InboundMessage, MessageSource};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub processed: u64,
    pub dead_lettered: u64,
    /// Messages left unacknowledged because the dead-letter write failed.
    pub dead_letter_failures: u64,
    pub inserted: u64,
    pub duplicates: u64,
    /// Records the store refused and that were dropped from the buffer.
    pub rejected: u64,
}

/// Single-threaded poll → process → persist loop for one consumer.
pub struct ConsumerLoop<Src, D, S>
where
    Src: MessageSource,
    D: DeadLetterSink,
    S: ScoredTransactionStore,
{
    source: Src,
    dead_letters: D,
    service: ScoringService<S>,
    state: LoopState,
    summary: LoopSummary,
}

impl<Src, D, S> ConsumerLoop<Src, D, S>
where
    Src: MessageSource,
    D: DeadLetterSink,
    S: ScoredTransactionStore,
{
    pub fn new(source: Src, dead_letters: D, service: ScoringService<S>) -> Self {
        Self {
            source,
            dead_letters,
            service,
            state: LoopState::Running,
            summary: LoopSummary::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs until `cancel` fires or the transport fails. The write buffer is
    /// flushed on both paths; a transport error is returned after the flush.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<LoopSummary, StreamError> {
        while self.state == LoopState::Running {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                polled = self.source.poll() => Some(polled),
            };
            let Some(polled) = polled else {
                self.shutdown().await;
                break;
            };

            let outcome = match polled {
                Ok(Some(message)) => self.handle(message).await,
                Ok(None) => continue,
                Err(err) => Err(err),
            };

            if let Err(err) = outcome {
                tracing::error!("stream transport failure, stopping consumer: {}", err);
                self.shutdown().await;
                return Err(err);
            }
        }
        Ok(self.summary.clone())
    }

    async fn handle(&mut self, message: InboundMessage) -> Result<(), StreamError> {
        match self.service.process(&message.payload, Utc::now()).await {
            Ok(_) => self.summary.processed += 1,
            Err(err) => {
                tracing::warn!(
                    message_id = %message.id,
                    kind = err.kind(),
                    "routing message to dead-letter stream: {}",
                    err
                );
                if let Err(dl_err) = self.dead_letters.send(&message.payload, err.kind()).await {
                    // left unacknowledged so the stream redelivers it
                    tracing::error!(message_id = %message.id, "{}", dl_err);
                    self.summary.dead_letter_failures += 1;
                    return Ok(());
                }
                self.summary.dead_lettered += 1;
            }
        }
        self.source.ack(&message.id).await
    }

    async fn shutdown(&mut self) {
        self.transition(LoopState::ShuttingDown);
        let pending = self.service.buffered();
        match self.service.flush().await {
            Ok(_) => tracing::info!(records = pending, "flushed remaining transactions"),
            Err(err) => tracing::error!(
                records = self.service.buffered(),
                "final flush failed, buffered records lost: {}",
                err
            ),
        }

        let totals = self.service.write_totals();
        self.summary.inserted = totals.inserted as u64;
        self.summary.duplicates = totals.duplicates as u64;
        self.summary.rejected = totals.rejected as u64;
        self.transition(LoopState::Stopped);
    }

    fn transition(&mut self, next: LoopState) {
        tracing::info!(from = ?self.state, to = ?next, "consumer state change");
        self.state = next;
    }
}
