//! # Order Materializer
//!
//! Turns one admitted intent into a durable order.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  try_acquire("order:<user>")                                            │
//! │     └── busy ──────────────────────────────► Err(LockBusy)              │
//! │                                                                         │
//! │  OrderRepository::place_order (one transaction)                        │
//! │     ├── order exists ──────────────────────► AlreadyExists              │
//! │     ├── stock = stock - 1 WHERE stock > 0                               │
//! │     │      └── 0 rows ─────────────────────► OutOfStock                 │
//! │     └── INSERT order (pre-assigned id) ────► Created                    │
//! │                                                                         │
//! │  release lock (every path after acquisition)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Replaying an intent is harmless: the second run finds the order and
//! writes nothing.

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{SeckillError, SeckillResult};
use seckill_cache::DistributedLock;
use seckill_core::PurchaseIntent;
use seckill_db::{Database, PlaceOrderOutcome};

/// Final state of one materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// Order row written and persisted stock taken.
    Created,
    /// The buyer already has an order for this voucher.
    AlreadyExists,
    /// Persisted stock ran out.
    OutOfStock,
}

impl From<PlaceOrderOutcome> for MaterializeOutcome {
    fn from(outcome: PlaceOrderOutcome) -> Self {
        match outcome {
            PlaceOrderOutcome::Created => MaterializeOutcome::Created,
            PlaceOrderOutcome::Duplicate => MaterializeOutcome::AlreadyExists,
            PlaceOrderOutcome::OutOfStock => MaterializeOutcome::OutOfStock,
        }
    }
}

/// Writes orders under the buyer's distributed lock.
#[derive(Clone)]
pub struct OrderMaterializer {
    db: Database,
    lock: DistributedLock,
}

impl OrderMaterializer {
    pub fn new(db: Database, lock: DistributedLock) -> Self {
        OrderMaterializer { db, lock }
    }

    /// Materializes `intent`. Lock contention is reported as
    /// [`SeckillError::LockBusy`] without touching the database.
    pub async fn materialize(&self, intent: &PurchaseIntent) -> SeckillResult<MaterializeOutcome> {
        let name = DistributedLock::order_lock_name(intent.user_id);
        let Some(guard) = self.lock.try_acquire(&name).await? else {
            warn!(
                order_id = intent.order_id,
                user_id = intent.user_id,
                "Order lock busy, not materializing"
            );
            return Err(SeckillError::LockBusy {
                user_id: intent.user_id,
            });
        };

        let placed = self
            .db
            .orders()
            .place_order(&intent.to_order(Utc::now()))
            .await;

        if let Err(e) = guard.release().await {
            warn!(user_id = intent.user_id, error = %e, "Failed to release order lock");
        }

        let outcome = MaterializeOutcome::from(placed?);
        match outcome {
            MaterializeOutcome::Created => info!(
                order_id = intent.order_id,
                user_id = intent.user_id,
                voucher_id = intent.voucher_id,
                "Order created"
            ),
            MaterializeOutcome::AlreadyExists => warn!(
                order_id = intent.order_id,
                user_id = intent.user_id,
                voucher_id = intent.voucher_id,
                "User already ordered this voucher"
            ),
            MaterializeOutcome::OutOfStock => warn!(
                order_id = intent.order_id,
                voucher_id = intent.voucher_id,
                "Persisted stock exhausted"
            ),
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use seckill_cache::{CacheStore, MemoryStore};
    use seckill_core::Voucher;
    use seckill_db::DbConfig;
    use std::sync::Arc;
    use std::time::Duration;

    async fn setup(stock: i64) -> (Arc<MemoryStore>, Database, OrderMaterializer) {
        let store = Arc::new(MemoryStore::new());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let begin = Utc::now();
        db.vouchers()
            .upsert(&Voucher {
                id: 1,
                stock,
                begin_time: begin,
                end_time: begin + ChronoDuration::hours(1),
            })
            .await
            .unwrap();

        let lock = DistributedLock::new(store.clone(), Duration::from_secs(30));
        (store, db.clone(), OrderMaterializer::new(db, lock))
    }

    #[tokio::test]
    async fn test_replayed_intent_creates_one_order() {
        let (store, db, materializer) = setup(5).await;
        let intent = PurchaseIntent::new(100, 7, 1);

        assert_eq!(
            materializer.materialize(&intent).await.unwrap(),
            MaterializeOutcome::Created
        );
        assert_eq!(
            materializer.materialize(&intent).await.unwrap(),
            MaterializeOutcome::AlreadyExists
        );

        assert_eq!(db.orders().count_by_voucher(1).await.unwrap(), 1);
        assert_eq!(db.vouchers().get_by_id(1).await.unwrap().unwrap().stock, 4);
        // Lock released on both paths
        assert!(store.get("lock:order:7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_out_of_stock_writes_nothing() {
        let (_store, db, materializer) = setup(0).await;

        let outcome = materializer
            .materialize(&PurchaseIntent::new(100, 7, 1))
            .await
            .unwrap();

        assert_eq!(outcome, MaterializeOutcome::OutOfStock);
        assert!(db.orders().get_by_id(100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_busy_lock_leaves_database_untouched() {
        let (store, db, materializer) = setup(5).await;
        store
            .set_if_absent("lock:order:7", "someone-else", Duration::from_secs(30))
            .await
            .unwrap();

        let err = materializer
            .materialize(&PurchaseIntent::new(100, 7, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, SeckillError::LockBusy { user_id: 7 }));
        assert!(err.is_retryable());
        assert_eq!(db.orders().count_by_voucher(1).await.unwrap(), 0);
        assert_eq!(
            store.get("lock:order:7").await.unwrap().as_deref(),
            Some("someone-else")
        );
    }

    #[tokio::test]
    async fn test_unknown_voucher_is_terminal_and_releases_lock() {
        let (store, _db, materializer) = setup(5).await;

        // No row for voucher 42: the conditional decrement touches nothing
        let outcome = materializer
            .materialize(&PurchaseIntent::new(100, 7, 42))
            .await
            .unwrap();

        assert_eq!(outcome, MaterializeOutcome::OutOfStock);
        assert!(store.get("lock:order:7").await.unwrap().is_none());
    }
}
