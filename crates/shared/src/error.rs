//! Error taxonomy for the chatdesk core

use thiserror::Error;

use crate::types::Bucket;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested transition is not legal from the conversation's
    /// current bucket. Always names both states so callers can render a
    /// specific message.
    #[error("invalid transition: operation requires {expected:?}, conversation is {actual:?}")]
    InvalidTransition { expected: Bucket, actual: Bucket },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Lost a concurrent race (e.g. another agent took the conversation first)
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound("row"),
            sqlx::Error::Database(db_err) => {
                // PostgreSQL unique violation
                if db_err.code().as_deref() == Some("23505") {
                    return CoreError::Conflict("resource already exists".to_string());
                }
                CoreError::Storage(db_err.to_string())
            }
            _ => CoreError::Storage(err.to_string()),
        }
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_names_both_states() {
        let err = CoreError::InvalidTransition {
            expected: Bucket::Inbox,
            actual: Bucket::Taken,
        };
        let msg = err.to_string();
        assert!(msg.contains("Inbox"));
        assert!(msg.contains("Taken"));
    }
}
