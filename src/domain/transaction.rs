use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated inbound payment transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Approved,
    Review,
    Declined,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Approved => "APPROVED",
            DecisionStatus::Review => "REVIEW",
            DecisionStatus::Declined => "DECLINED",
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    MlModel,
    VelocityRule,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::MlModel => "ML_MODEL",
            ReasonCode::VelocityRule => "VELOCITY_RULE",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted outcome of scoring one transaction. Append-only, keyed by
/// `transaction_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTransaction {
    pub transaction_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub features: Vec<f64>,
    pub score: f64,
    pub prediction: i16,
    pub status: DecisionStatus,
    pub reason: ReasonCode,
    pub created_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

impl ScoredTransaction {
    pub fn latency_ms(&self) -> i64 {
        (self.processed_at - self.created_at).num_milliseconds()
    }
}
