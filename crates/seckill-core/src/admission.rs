//! # Admission Codes
//!
//! The admission script answers with a bare integer. This module gives those
//! integers names and turns them into the business rejections callers see.
//!
//! ```text
//! ┌──────┬──────────────────┬───────────────────────────────────────────┐
//! │ code │ AdmissionCode    │ meaning                                   │
//! ├──────┼──────────────────┼───────────────────────────────────────────┤
//! │  0   │ Admitted         │ stock taken, user recorded, intent queued │
//! │  1   │ NoStock          │ counter absent or <= 0, nothing mutated   │
//! │  2   │ DuplicateOrder   │ user already admitted, nothing mutated    │
//! └──────┴──────────────────┴───────────────────────────────────────────┘
//! ```
//! The stock check runs before the duplicate check, so a repeat buyer on a
//! sold-out voucher sees `NoStock`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Result code of one admission script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdmissionCode {
    Admitted,
    NoStock,
    DuplicateOrder,
}

impl AdmissionCode {
    /// Parses the integer returned by the script.
    pub fn from_code(code: i64) -> CoreResult<Self> {
        match code {
            0 => Ok(AdmissionCode::Admitted),
            1 => Ok(AdmissionCode::NoStock),
            2 => Ok(AdmissionCode::DuplicateOrder),
            other => Err(CoreError::UnknownAdmissionCode(other)),
        }
    }

    /// Returns the wire integer for this code.
    pub const fn code(self) -> i64 {
        match self {
            AdmissionCode::Admitted => 0,
            AdmissionCode::NoStock => 1,
            AdmissionCode::DuplicateOrder => 2,
        }
    }

    /// `Ok(())` when admitted, otherwise the rejection to report.
    pub fn into_result(self) -> Result<(), Rejection> {
        match self {
            AdmissionCode::Admitted => Ok(()),
            AdmissionCode::NoStock => Err(Rejection::NoStock),
            AdmissionCode::DuplicateOrder => Err(Rejection::DuplicateOrder),
        }
    }
}

/// A business-rule rejection returned synchronously to the buyer.
///
/// Never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    NoStock,
    DuplicateOrder,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NoStock => write!(f, "no stock"),
            Rejection::DuplicateOrder => write!(f, "duplicate order"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_parse() {
        assert_eq!(AdmissionCode::from_code(0).unwrap(), AdmissionCode::Admitted);
        assert_eq!(AdmissionCode::from_code(1).unwrap(), AdmissionCode::NoStock);
        assert_eq!(
            AdmissionCode::from_code(2).unwrap(),
            AdmissionCode::DuplicateOrder
        );
        assert_eq!(
            AdmissionCode::from_code(-1),
            Err(CoreError::UnknownAdmissionCode(-1))
        );
    }

    #[test]
    fn test_code_matches_wire_value() {
        for code in [
            AdmissionCode::Admitted,
            AdmissionCode::NoStock,
            AdmissionCode::DuplicateOrder,
        ] {
            assert_eq!(AdmissionCode::from_code(code.code()).unwrap(), code);
        }
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(AdmissionCode::Admitted.into_result(), Ok(()));
        assert_eq!(
            AdmissionCode::NoStock.into_result(),
            Err(Rejection::NoStock)
        );
        assert_eq!(Rejection::NoStock.to_string(), "no stock");
        assert_eq!(Rejection::DuplicateOrder.to_string(), "duplicate order");
    }
}
