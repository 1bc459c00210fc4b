use crate::domain::transaction::ScoredTransaction;
use crate::error::StoreError;
use crate::repo::store::{FlushReport, ScoredTransactionStore};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Process-local store with the same idempotency contract as the Postgres
/// repo. Used by tests and for running the worker without a database.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<ScoredTransaction>>,
    insert_calls: AtomicUsize,
    count_calls: AtomicUsize,
    unavailable: AtomicBool,
    inserts_unavailable: AtomicBool,
    refused: Mutex<HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fails inserts with `StoreError::Unavailable` while reads keep working.
    pub fn set_inserts_unavailable(&self, unavailable: bool) {
        self.inserts_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Any batch containing `transaction_id` fails with a non-transient
    /// `StoreError::Query`, like a constraint violation in Postgres.
    pub async fn refuse(&self, transaction_id: &str) {
        self.refused.lock().await.insert(transaction_id.to_string());
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub async fn records(&self) -> Vec<ScoredTransaction> {
        self.records.lock().await.clone()
    }

    /// Seeds history directly, bypassing the idempotency check.
    pub async fn seed(&self, records: Vec<ScoredTransaction>) {
        self.records.lock().await.extend(records);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ScoredTransactionStore for InMemoryStore {
    async fn insert_batch(&self, records: &[ScoredTransaction]) -> Result<FlushReport, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.inserts_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store refusing writes".to_string()));
        }
        {
            let refused = self.refused.lock().await;
            if let Some(bad) = records.iter().find(|r| refused.contains(&r.transaction_id)) {
                return Err(StoreError::Query(format!(
                    "transaction {} violates a column constraint",
                    bad.transaction_id
                )));
            }
        }

        let mut stored = self.records.lock().await;
        let mut report = FlushReport::default();
        for record in records {
            if stored.iter().any(|r| r.transaction_id == record.transaction_id) {
                report.duplicates += 1;
            } else {
                stored.push(record.clone());
                report.inserted += 1;
            }
        }
        Ok(report)
    }

    async fn count_since(&self, customer_id: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let stored = self.records.lock().await;
        Ok(stored
            .iter()
            .filter(|r| r.customer_id == customer_id && r.created_at >= since)
            .count() as i64)
    }
}
