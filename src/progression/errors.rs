use thiserror::Error;

/// Failures reported by a record store implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic lock failure, the stored version moved on
    #[error("Version conflict: expected {expected}, found {actual}")]
    Conflict { expected: i64, actual: i64 },

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A stored value the engine cannot interpret
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgressionError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Check-in failed after {attempts} attempts: {reason}")]
    CheckInFailed { attempts: u32, reason: String },

    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl ProgressionError {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProgressionError::TransientStore(_) | ProgressionError::ConcurrencyConflict(_)
        )
    }
}

impl From<StoreError> for ProgressionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => ProgressionError::TransientStore(msg),
            StoreError::NotFound(msg) => ProgressionError::NotFound(msg),
            conflict @ StoreError::Conflict { .. } => {
                ProgressionError::ConcurrencyConflict(conflict.to_string())
            }
            StoreError::Duplicate(msg) | StoreError::InvalidData(msg) => {
                ProgressionError::Validation(msg)
            }
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(db_err.message().to_string())
            }
            other => StoreError::Transient(other.to_string()),
        }
    }
}
