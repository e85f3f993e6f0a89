//! # Seckill Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Seckill Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Business     │  │     Infrastructure      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Rejected       │  │  Database               │ │
//! │  │  ConfigLoad...  │  │  (no stock,     │  │  Cache                  │ │
//! │  │                 │  │   duplicate)    │  │  Domain                 │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │ Materialization │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  LockBusy       │  │  Internal       │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business rejections are answers, not failures: they go back to the buyer
//! and are never retried.

use seckill_cache::CacheError;
use seckill_core::{CoreError, Rejection};
use seckill_db::DbError;
use thiserror::Error;

/// Result type alias for seckill operations.
pub type SeckillResult<T> = Result<T, SeckillError>;

/// Seckill error type.
#[derive(Debug, Error)]
pub enum SeckillError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid seckill configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Business Errors
    // =========================================================================
    /// Purchase refused by admission.
    #[error("{0}")]
    Rejected(Rejection),

    // =========================================================================
    // Materialization Errors
    // =========================================================================
    /// Another worker holds the buyer's order lock.
    #[error("Order lock for user {user_id} is held elsewhere")]
    LockBusy { user_id: i64 },

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Relational store failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Key-value store failure.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Domain rule violated.
    #[error(transparent)]
    Domain(#[from] CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SeckillError {
    /// Returns true if the operation may succeed when retried.
    ///
    /// ## Retryable Errors
    /// - Lock contention (the lease bounds how long it lasts)
    /// - Connection and query failures of either store
    ///
    /// ## Non-Retryable Errors
    /// - Business rejections
    /// - Constraint violations other than uniqueness (e.g. unknown voucher)
    /// - Malformed data, configuration problems
    pub fn is_retryable(&self) -> bool {
        match self {
            SeckillError::LockBusy { .. } => true,
            SeckillError::Cache(e) => e.is_retryable(),
            SeckillError::Database(e) => matches!(
                e,
                DbError::ConnectionFailed(_)
                    | DbError::QueryFailed(_)
                    | DbError::PoolExhausted
                    | DbError::Internal(_)
            ),
            _ => false,
        }
    }

    /// Returns the business rejection, if this is one.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            SeckillError::Rejected(r) => Some(*r),
            _ => None,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SeckillError::InvalidConfig(_) | SeckillError::ConfigLoadFailed(_)
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<Rejection> for SeckillError {
    fn from(rejection: Rejection) -> Self {
        SeckillError::Rejected(rejection)
    }
}

impl From<std::io::Error> for SeckillError {
    fn from(err: std::io::Error) -> Self {
        SeckillError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SeckillError {
    fn from(err: toml::de::Error) -> Self {
        SeckillError::ConfigLoadFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_display_reason_and_never_retry() {
        let err = SeckillError::from(Rejection::NoStock);

        assert_eq!(err.to_string(), "no stock");
        assert_eq!(err.rejection(), Some(Rejection::NoStock));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retry_classification() {
        assert!(SeckillError::LockBusy { user_id: 7 }.is_retryable());
        assert!(SeckillError::from(DbError::PoolExhausted).is_retryable());
        assert!(SeckillError::from(CacheError::ConnectionFailed("down".into())).is_retryable());

        let fk = DbError::ForeignKeyViolation {
            message: "FOREIGN KEY constraint failed".into(),
        };
        assert!(!SeckillError::from(fk).is_retryable());
        assert!(!SeckillError::from(CoreError::MissingField("id")).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SeckillError::InvalidConfig("x".into()).is_config_error());
        assert!(!SeckillError::LockBusy { user_id: 1 }.is_config_error());
    }
}
