use crate::domain::transaction::ScoredTransaction;
use crate::error::StoreError;
use crate::repo::store::{FlushReport, ScoredTransactionStore};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

// 10 binds per row, well under the Postgres limit of 65535 parameters.
const MAX_ROWS_PER_STATEMENT: usize = 1000;

#[derive(Clone)]
pub struct ScoredTransactionsRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl ScoredTransactionStore for ScoredTransactionsRepo {
    async fn insert_batch(&self, records: &[ScoredTransaction]) -> Result<FlushReport, StoreError> {
        if records.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;
        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query = QueryBuilder::<Postgres>::new(
                r#"
                INSERT INTO scored_transactions (
                    transaction_id, customer_id, amount, features, score,
                    prediction, status, reason, created_at, processed_at
                )
                "#,
            );
            query.push_values(chunk, |mut row, r| {
                row.push_bind(r.transaction_id.clone())
                    .push_bind(r.customer_id.clone())
                    .push_bind(r.amount)
                    .push_bind(r.features.clone())
                    .push_bind(r.score)
                    .push_bind(r.prediction)
                    .push_bind(r.status.as_str())
                    .push_bind(r.reason.as_str())
                    .push_bind(r.created_at)
                    .push_bind(r.processed_at);
            });
            query.push(" ON CONFLICT (transaction_id) DO NOTHING");

            let result = query.build().execute(tx.as_mut()).await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;

        Ok(FlushReport {
            inserted,
            duplicates: records.len() - inserted,
            rejected: 0,
        })
    }

    async fn count_since(&self, customer_id: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS recent
            FROM scored_transactions
            WHERE customer_id = $1 AND created_at >= $2
            "#,
        )
        .bind(customer_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("recent"))
    }
}
