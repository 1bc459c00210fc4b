use crate::config::RetrySettings;
use crate::domain::transaction::ScoredTransaction;
use crate::error::StoreError;
use crate::repo::store::{FlushReport, ScoredTransactionStore};
use crate::service::retry::with_backoff;
use std::sync::Arc;

/// Pending scored transactions awaiting a bulk insert.
///
/// Owned by a single pipeline and never holds more than `batch_size` records.
/// A record whose own save fails is taken back out, so the caller can
/// dead-letter its message without the record being written later. Records
/// buffered by earlier saves stay until the store accepts or refuses them.
pub struct WriteBuffer<S: ScoredTransactionStore> {
    store: Arc<S>,
    batch_size: usize,
    retry: RetrySettings,
    pending: Vec<ScoredTransaction>,
    totals: FlushReport,
}

/// Outcome of writing the pending records.
#[derive(Default)]
struct Written {
    report: FlushReport,
    /// Records the store refused, by `transaction_id`.
    refused: Vec<(String, StoreError)>,
}

impl<S: ScoredTransactionStore> WriteBuffer<S> {
    pub fn new(store: Arc<S>, batch_size: usize, retry: RetrySettings) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            retry,
            pending: Vec::with_capacity(batch_size),
            totals: FlushReport::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Everything written, skipped or refused since the buffer was created.
    pub fn totals(&self) -> FlushReport {
        self.totals
    }

    /// Buffers a record, flushing once the batch is full. Returns the flush
    /// report when a flush happened.
    ///
    /// On error the record is no longer buffered: either the flush failed and
    /// it was taken back out, or the store refused this record itself.
    pub async fn save(&mut self, record: ScoredTransaction) -> Result<Option<FlushReport>, StoreError> {
        let transaction_id = record.transaction_id.clone();
        self.pending.push(record);
        if self.pending.len() < self.batch_size {
            return Ok(None);
        }

        match self.write_pending().await {
            Ok(mut written) => {
                if let Some(pos) = written.refused.iter().position(|(id, _)| *id == transaction_id) {
                    return Err(written.refused.swap_remove(pos).1);
                }
                Ok(Some(written.report))
            }
            Err(err) => {
                // a failed write never drains past its failing record, so ours is still last
                self.pending.pop();
                Err(err)
            }
        }
    }

    /// Writes everything pending. No store call when empty.
    pub async fn flush(&mut self) -> Result<FlushReport, StoreError> {
        if self.pending.is_empty() {
            return Ok(FlushReport::default());
        }
        Ok(self.write_pending().await?.report)
    }

    async fn write_pending(&mut self) -> Result<Written, StoreError> {
        let store = &self.store;
        let pending = &self.pending;
        let result = with_backoff(&self.retry, "insert_batch", move || store.insert_batch(pending)).await;
        let written = match result {
            Ok(report) => {
                self.pending.clear();
                Written {
                    report,
                    refused: Vec::new(),
                }
            }
            Err(err) if err.is_transient() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    records = self.pending.len(),
                    "batch insert refused, writing records one at a time: {}",
                    err
                );
                self.write_each().await?
            }
        };

        self.totals.merge(written.report);
        if written.report.duplicates > 0 {
            tracing::warn!(
                duplicates = written.report.duplicates,
                inserted = written.report.inserted,
                "skipped already persisted transactions during flush"
            );
        }
        tracing::debug!(
            inserted = written.report.inserted,
            rejected = written.report.rejected,
            "flushed write buffer"
        );
        Ok(written)
    }

    /// Inserts pending records individually so one refused record cannot hold
    /// back the rest. Stops at the first transient failure, keeping that
    /// record and everything after it.
    async fn write_each(&mut self) -> Result<Written, StoreError> {
        let mut written = Written::default();
        let mut done = 0;
        let mut failure = None;

        for record in &self.pending {
            let store = &self.store;
            let one = std::slice::from_ref(record);
            match with_backoff(&self.retry, "insert_record", move || store.insert_batch(one)).await {
                Ok(report) => written.report.merge(report),
                Err(err) if err.is_transient() => {
                    failure = Some(err);
                    break;
                }
                Err(err) => {
                    tracing::error!(
                        transaction_id = %record.transaction_id,
                        customer_id = %record.customer_id,
                        "store refused transaction, dropping it: {}",
                        err
                    );
                    written.report.rejected += 1;
                    written.refused.push((record.transaction_id.clone(), err));
                }
            }
            done += 1;
        }

        self.pending.drain(..done);
        match failure {
            Some(err) => {
                self.totals.merge(written.report);
                Err(err)
            }
            None => Ok(written),
        }
    }
}
