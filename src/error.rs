//! Error taxonomy for the scoring pipeline.
//!
//! Per-message failures (`ValidationError`, `FeatureShapeError`, `StoreError`)
//! are folded into [`ProcessingError`] and routed to the dead-letter stream by
//! the consumer loop. `StreamError` is fatal for the loop. `ArtifactError` and
//! `ConfigError` stop the worker before the loop starts.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("payload is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("field `{field}` must be {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("field `{field}` out of range: {detail}")]
    OutOfRange { field: String, detail: String },

    #[error("feature vector has {found} values, model expects {expected}")]
    FeatureCount { expected: usize, found: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("feature vector has {actual} values, model expects {expected}")]
pub struct FeatureShapeError {
    pub expected: usize,
    pub actual: usize,
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection-level failure worth retrying.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream transport error: {0}")]
    Transport(String),

    #[error("stream entry {id} has no `{field}` field")]
    MissingPayload { id: String, field: &'static str },
}

impl From<redis::RedisError> for StreamError {
    fn from(err: redis::RedisError) -> Self {
        StreamError::Transport(err.to_string())
    }
}

#[derive(Error, Debug)]
#[error("dead-letter delivery to `{stream}` failed: {reason}")]
pub struct DeadLetterError {
    pub stream: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("model artifact not found at {0}")]
    Missing(String),

    #[error("failed to read model artifact {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("invalid model artifact {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("scaler expects {scaler} features but model expects {model}")]
    DimensionMismatch { scaler: usize, model: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why a single message could not be scored and persisted.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    FeatureShape(#[from] FeatureShapeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcessingError {
    /// Short label written next to the payload on the dead-letter stream.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingError::Validation(_) => "VALIDATION_ERROR",
            ProcessingError::FeatureShape(_) => "FEATURE_SHAPE_ERROR",
            ProcessingError::Store(e) if e.is_transient() => "STORE_UNAVAILABLE",
            ProcessingError::Store(_) => "STORE_ERROR",
        }
    }
}
