use crate::config::RetrySettings;
use crate::error::StoreError;
use crate::repo::store::ScoredTransactionStore;
use crate::service::retry::with_backoff;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Counts a customer's recent transactions from the store.
///
/// Only flushed records are visible: decisions still sitting in the write
/// buffer do not count towards the window.
pub struct VelocityCounter<S: ScoredTransactionStore> {
    store: Arc<S>,
    retry: RetrySettings,
}

impl<S: ScoredTransactionStore> VelocityCounter<S> {
    pub fn new(store: Arc<S>, retry: RetrySettings) -> Self {
        Self { store, retry }
    }

    pub async fn count_recent(&self, customer_id: &str, window_seconds: i64) -> Result<i64, StoreError> {
        self.count_recent_at(customer_id, window_seconds, Utc::now()).await
    }

    pub async fn count_recent_at(
        &self,
        customer_id: &str,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let since = now - Duration::seconds(window_seconds);
        with_backoff(&self.retry, "count_recent", move || self.store.count_since(customer_id, since)).await
    }
}
