use crate::config::RetrySettings;
use crate::domain::parse::TransactionParser;
use crate::domain::transaction::{ReasonCode, ScoredTransaction};
use crate::error::{ProcessingError, StoreError};
use crate::model::predictor::Predictor;
use crate::repo::store::{FlushReport, ScoredTransactionStore};
use crate::scoring::engine::decide;
use crate::scoring::types::{Decision, DecisionPolicy};
use crate::scoring::velocity::VelocityCounter;
use crate::service::write_buffer::WriteBuffer;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringOutcome {
    pub transaction_id: String,
    pub model_score: f64,
    pub decision: Decision,
    pub recent_count: i64,
    pub latency_ms: i64,
}

/// Parse, predict, apply the velocity rule, classify, buffer.
pub struct ScoringService<S: ScoredTransactionStore> {
    parser: TransactionParser,
    predictor: Arc<Predictor>,
    velocity: VelocityCounter<S>,
    policy: DecisionPolicy,
    buffer: WriteBuffer<S>,
}

impl<S: ScoredTransactionStore> ScoringService<S> {
    pub fn new(
        predictor: Arc<Predictor>,
        store: Arc<S>,
        policy: DecisionPolicy,
        batch_size: usize,
        retry: RetrySettings,
    ) -> Self {
        Self {
            parser: TransactionParser::new(predictor.n_features()),
            velocity: VelocityCounter::new(store.clone(), retry),
            buffer: WriteBuffer::new(store, batch_size, retry),
            predictor,
            policy,
        }
    }

    /// Overrides the parser, e.g. to accept a different feature count than the
    /// model so that shape errors surface at prediction time.
    pub fn with_parser(mut self, parser: TransactionParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Running totals of what the write buffer has persisted or dropped.
    pub fn write_totals(&self) -> FlushReport {
        self.buffer.totals()
    }

    pub async fn process(&mut self, raw: &str, observed_at: DateTime<Utc>) -> Result<ScoringOutcome, ProcessingError> {
        let tx = self.parser.parse(raw)?;
        let prediction = self.predictor.predict(&tx.features)?;

        let recent_count = self
            .velocity
            .count_recent(&tx.customer_id, self.policy.velocity_window_seconds)
            .await?;

        let decision = decide(prediction.score, recent_count, &self.policy);
        if decision.reason == ReasonCode::VelocityRule {
            tracing::warn!(
                customer_id = %tx.customer_id,
                recent_count,
                window_seconds = self.policy.velocity_window_seconds,
                "velocity alert"
            );
        }

        let record = ScoredTransaction {
            transaction_id: tx.transaction_id,
            customer_id: tx.customer_id,
            amount: tx.amount,
            features: tx.features,
            score: decision.final_score,
            prediction: prediction.prediction,
            status: decision.status,
            reason: decision.reason,
            created_at: observed_at,
            processed_at: Utc::now(),
        };
        let latency_ms = record.latency_ms();

        tracing::info!(
            transaction_id = %record.transaction_id,
            customer_id = %record.customer_id,
            model_score = prediction.score,
            score = decision.final_score,
            status = %decision.status,
            reason = %decision.reason,
            recent_count,
            latency_ms,
            "transaction scored"
        );

        let transaction_id = record.transaction_id.clone();
        self.buffer.save(record).await?;

        Ok(ScoringOutcome {
            transaction_id,
            model_score: prediction.score,
            decision,
            recent_count,
            latency_ms,
        })
    }

    pub async fn flush(&mut self) -> Result<FlushReport, StoreError> {
        self.buffer.flush().await
    }
}
