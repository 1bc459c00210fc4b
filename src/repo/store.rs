use crate::domain::transaction::ScoredTransaction;
use crate::error::StoreError;
use chrono::{DateTime, Utc};

/// Result of one idempotent batch insert, or a running total of several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub inserted: usize,
    /// Records whose `transaction_id` was already stored.
    pub duplicates: usize,
    /// Records the store refused outright and that were dropped.
    pub rejected: usize,
}

impl FlushReport {
    pub fn merge(&mut self, other: FlushReport) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
    }
}

/// Record store for scored transactions.
///
/// `insert_batch` must be idempotent per `transaction_id`: a record whose id
/// already exists is skipped without affecting the rest of the batch.
#[async_trait::async_trait]
pub trait ScoredTransactionStore: Send + Sync {
    async fn insert_batch(&self, records: &[ScoredTransaction]) -> Result<FlushReport, StoreError>;

    /// Stored transactions for `customer_id` with `created_at >= since`.
    async fn count_since(&self, customer_id: &str, since: DateTime<Utc>) -> Result<i64, StoreError>;
}
