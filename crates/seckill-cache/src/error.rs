//! # Cache Error Types
//!
//! ```text
//! redis::RedisError ──► CacheError (this module) ──► SeckillError (seckill-order)
//! CoreError ─────────┘
//! ```

use seckill_core::CoreError;
use thiserror::Error;

/// Result type alias for key-value store operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value store errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Store unreachable or connection dropped.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Command rejected or failed server side.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Reply did not have the expected shape.
    ///
    /// ## When This Occurs
    /// - A stream entry id that is not `<ms>-<seq>`
    /// - A stream field value that is not a string
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Domain rule violated (id layout, admission code).
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CacheError {
    /// Returns true if the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CacheError::ConnectionFailed(_) | CacheError::CommandFailed(_)
        )
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            CacheError::ConnectionFailed(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError {
            CacheError::UnexpectedReply(err.to_string())
        } else {
            CacheError::CommandFailed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_type_error_is_unexpected_reply() {
        let err: CacheError =
            redis::RedisError::from((redis::ErrorKind::TypeError, "not an integer")).into();

        assert!(matches!(err, CacheError::UnexpectedReply(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_core_errors_are_not_retryable() {
        let err: CacheError = CoreError::UnknownAdmissionCode(9).into();

        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), CoreError::UnknownAdmissionCode(9).to_string());
    }
}
