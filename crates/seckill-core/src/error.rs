//! # Error Types
//!
//! Domain errors for seckill-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  seckill-core   CoreError    - malformed intents, id layout limits     │
//! │  seckill-db     DbError      - relational storage failures             │
//! │  seckill-cache  CacheError   - key-value store failures                │
//! │  seckill-order  SeckillError - what callers of the service see         │
//! │                                                                         │
//! │  Business rejections (no stock, duplicate order) are NOT errors here:  │
//! │  they are `Rejection` values carried by `SeckillError::Rejected`.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A stream entry is missing one of the intent fields.
    #[error("Intent field '{0}' is missing")]
    MissingField(&'static str),

    /// A stream entry field is present but not an integer.
    #[error("Intent field '{field}' is not an integer: '{value}'")]
    InvalidField { field: &'static str, value: String },

    /// The admission script returned a code outside 0 / 1 / 2.
    #[error("Unknown admission code: {0}")]
    UnknownAdmissionCode(i64),

    /// The clock reads earlier than the order id epoch.
    #[error("Timestamp {0} is before the order id epoch")]
    ClockBeforeEpoch(i64),

    /// A voucher definition breaks a domain invariant.
    #[error("Voucher {id} is invalid: {reason}")]
    InvalidVoucher { id: i64, reason: String },

    /// The per-day sequence no longer fits the low bits of an order id.
    #[error("Order id sequence {0} exceeds the 32-bit sequence space")]
    SequenceExhausted(i64),
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CoreError::MissingField("userId").to_string(),
            "Intent field 'userId' is missing"
        );
        assert_eq!(
            CoreError::UnknownAdmissionCode(7).to_string(),
            "Unknown admission code: 7"
        );
    }
}
