//! # Domain Types
//!
//! ```text
//! ┌─────────────────┐        ┌──────────────────┐        ┌─────────────────┐
//! │    Voucher      │ 1    * │  VoucherOrder    │        │ PurchaseIntent  │
//! │  ─────────────  │◄───────│  ──────────────  │◄───────│  ─────────────  │
//! │  id             │        │  id (= order_id) │  0..1  │  order_id       │
//! │  stock          │        │  user_id         │        │  user_id        │
//! │  begin_time     │        │  voucher_id      │        │  voucher_id     │
//! │  end_time       │        │  created_at      │        └─────────────────┘
//! └─────────────────┘        └──────────────────┘
//! ```
//!
//! A `PurchaseIntent` is what the admission script appends to the intent
//! stream. Each intent turns into at most one `VoucherOrder`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Voucher
// =============================================================================

/// A flash-sale voucher with a strictly limited stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Voucher {
    pub id: i64,

    /// Units left in persistent storage. Never driven below zero.
    pub stock: i64,

    pub begin_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,
}

impl Voucher {
    /// Checks the invariants a voucher must hold before it goes on sale.
    pub fn validate(&self) -> CoreResult<()> {
        if self.stock < 0 {
            return Err(CoreError::InvalidVoucher {
                id: self.id,
                reason: format!("stock {} is negative", self.stock),
            });
        }
        if self.end_time <= self.begin_time {
            return Err(CoreError::InvalidVoucher {
                id: self.id,
                reason: "sale window ends before it begins".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Voucher Order
// =============================================================================

/// A durable order row. Its existence for `(user_id, voucher_id)` is the
/// persistent truth of "already bought".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VoucherOrder {
    pub id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchase Intent
// =============================================================================

/// Admitted-but-not-yet-materialized purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurchaseIntent {
    pub order_id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
}

impl PurchaseIntent {
    /// Stream field holding the order id.
    pub const FIELD_ORDER_ID: &'static str = "id";
    /// Stream field holding the buyer.
    pub const FIELD_USER_ID: &'static str = "userId";
    /// Stream field holding the voucher.
    pub const FIELD_VOUCHER_ID: &'static str = "voucherId";

    pub fn new(order_id: i64, user_id: i64, voucher_id: i64) -> Self {
        PurchaseIntent {
            order_id,
            user_id,
            voucher_id,
        }
    }

    /// Encodes the intent as string-keyed stream fields.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (Self::FIELD_USER_ID, self.user_id.to_string()),
            (Self::FIELD_VOUCHER_ID, self.voucher_id.to_string()),
            (Self::FIELD_ORDER_ID, self.order_id.to_string()),
        ]
    }

    /// Decodes an intent from stream fields. Unknown fields are ignored.
    pub fn from_fields(fields: &HashMap<String, String>) -> CoreResult<Self> {
        Ok(PurchaseIntent {
            order_id: parse_field(fields, Self::FIELD_ORDER_ID)?,
            user_id: parse_field(fields, Self::FIELD_USER_ID)?,
            voucher_id: parse_field(fields, Self::FIELD_VOUCHER_ID)?,
        })
    }

    /// The order row this intent materializes into.
    pub fn to_order(&self, created_at: DateTime<Utc>) -> VoucherOrder {
        VoucherOrder {
            id: self.order_id,
            user_id: self.user_id,
            voucher_id: self.voucher_id,
            created_at,
        }
    }
}

fn parse_field(fields: &HashMap<String, String>, field: &'static str) -> CoreResult<i64> {
    let raw = fields.get(field).ok_or(CoreError::MissingField(field))?;
    raw.trim().parse().map_err(|_| CoreError::InvalidField {
        field,
        value: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_intent_decodes_from_stream_fields() {
        let intent = PurchaseIntent::from_fields(&fields(&[
            ("id", "9001"),
            ("userId", "7"),
            ("voucherId", "3"),
        ]))
        .unwrap();

        assert_eq!(intent, PurchaseIntent::new(9001, 7, 3));
    }

    #[test]
    fn test_intent_fields_use_wire_names() {
        let encoded: HashMap<String, String> = PurchaseIntent::new(1, 2, 3)
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        assert_eq!(encoded["id"], "1");
        assert_eq!(encoded["userId"], "2");
        assert_eq!(encoded["voucherId"], "3");
    }

    #[test]
    fn test_intent_decode_errors() {
        let missing = PurchaseIntent::from_fields(&fields(&[("id", "1"), ("userId", "2")]));
        assert_eq!(missing, Err(CoreError::MissingField("voucherId")));

        let garbage = PurchaseIntent::from_fields(&fields(&[
            ("id", "1"),
            ("userId", "abc"),
            ("voucherId", "3"),
        ]));
        assert!(matches!(
            garbage,
            Err(CoreError::InvalidField { field: "userId", .. })
        ));
    }

    #[test]
    fn test_voucher_validation() {
        let mut voucher = Voucher {
            id: 1,
            stock: 10,
            begin_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
        };
        assert!(voucher.validate().is_ok());

        voucher.stock = -1;
        assert!(matches!(
            voucher.validate(),
            Err(CoreError::InvalidVoucher { id: 1, .. })
        ));

        voucher.stock = 1;
        voucher.end_time = voucher.begin_time;
        assert!(voucher.validate().is_err());
    }

    #[test]
    fn test_intent_serializes_to_json() {
        let json = serde_json::to_string(&PurchaseIntent::new(5, 6, 7)).unwrap();
        assert!(json.contains("\"order_id\":5"));
    }
}
