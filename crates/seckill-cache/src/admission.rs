//! # Admission Gate
//!
//! The linearization point of the whole pipeline. One atomic script decides
//! whether a user may buy a voucher and, when they may, records the purchase
//! and enqueues the intent in the same step.
//!
//! ```text
//!   GET seckill:stock:<vid>  ── absent or <= 0 ──► 1 (no stock)
//!        │
//!   SISMEMBER seckill:order:<vid> <uid> ── yes ──► 2 (duplicate order)
//!        │
//!   INCRBY stock -1
//!   SADD   seckill:order:<vid> <uid>
//!   XADD   stream.orders * userId voucherId id ──► 0 (admitted)
//! ```
//!
//! A caller that sees `Admitted` is guaranteed its intent is in the stream.

use std::sync::Arc;

use tracing::debug;

use crate::error::CacheResult;
use crate::store::CacheStore;
use seckill_core::{AdmissionCode, PurchaseIntent};

/// Key of the cached stock counter for a voucher.
pub fn stock_key(voucher_id: i64) -> String {
    format!("seckill:stock:{voucher_id}")
}

/// Key of the set of users already admitted for a voucher.
pub fn records_key(voucher_id: i64) -> String {
    format!("seckill:order:{voucher_id}")
}

/// The three keys the admission script touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionKeys {
    pub stock: String,
    pub records: String,
    pub stream: String,
}

impl AdmissionKeys {
    pub fn new(voucher_id: i64, stream: impl Into<String>) -> Self {
        AdmissionKeys {
            stock: stock_key(voucher_id),
            records: records_key(voucher_id),
            stream: stream.into(),
        }
    }
}

/// Runs admission and manages the cached campaign state it reads.
#[derive(Clone)]
pub struct AdmissionGate {
    store: Arc<dyn CacheStore>,
    stream: String,
}

impl AdmissionGate {
    /// Creates a gate that enqueues admitted intents on `stream`.
    pub fn new(store: Arc<dyn CacheStore>, stream: impl Into<String>) -> Self {
        AdmissionGate {
            store,
            stream: stream.into(),
        }
    }

    /// Atomically admits or rejects `intent`.
    pub async fn admit(&self, intent: &PurchaseIntent) -> CacheResult<AdmissionCode> {
        let keys = AdmissionKeys::new(intent.voucher_id, self.stream.as_str());
        let raw = self.store.admit(&keys, intent).await?;
        let code = AdmissionCode::from_code(raw)?;

        debug!(
            order_id = intent.order_id,
            user_id = intent.user_id,
            voucher_id = intent.voucher_id,
            code = raw,
            "Admission evaluated"
        );
        Ok(code)
    }

    /// Sets the cached stock counter, opening the voucher for admission.
    pub async fn load_stock(&self, voucher_id: i64, stock: i64) -> CacheResult<()> {
        self.store
            .set(&stock_key(voucher_id), &stock.to_string())
            .await
    }

    /// Cached stock left, if the voucher has been loaded.
    pub async fn remaining_stock(&self, voucher_id: i64) -> CacheResult<Option<i64>> {
        let raw = self.store.get(&stock_key(voucher_id)).await?;
        Ok(raw.and_then(|v| v.parse().ok()))
    }

    /// Whether `user_id` has already been admitted for `voucher_id`.
    pub async fn has_purchased(&self, voucher_id: i64, user_id: i64) -> CacheResult<bool> {
        self.store
            .is_member(&records_key(voucher_id), &user_id.to_string())
            .await
    }

    /// Drops the stock counter and purchase records of a finished campaign.
    pub async fn clear(&self, voucher_id: i64) -> CacheResult<()> {
        self.store
            .delete(&[stock_key(voucher_id), records_key(voucher_id)])
            .await
    }
}
