//! # Order Repository
//!
//! Voucher order rows, plus the transactional "place order" unit the
//! materializer runs under its per-user lock.
//!
//! ## place_order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SINGLE TRANSACTION                                 │
//! │                                                                         │
//! │  1. SELECT ... WHERE user_id = ? AND voucher_id = ?                    │
//! │        └── row found ──────────────► Duplicate   (nothing written)     │
//! │                                                                         │
//! │  2. UPDATE seckill_vouchers SET stock = stock - 1 WHERE stock > 0      │
//! │        └── 0 rows ─────────────────► OutOfStock  (rolled back)         │
//! │                                                                         │
//! │  3. INSERT INTO voucher_orders (id = pre-assigned order id)            │
//! │        └── UNIQUE violation ───────► Duplicate   (rolled back)         │
//! │                                                                         │
//! │  COMMIT ─────────────────────────────► Created                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::voucher::decrement_stock_on;
use seckill_core::VoucherOrder;

/// What `place_order` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOrderOutcome {
    /// Stock decremented and the order row written.
    Created,
    /// An order for this (user, voucher) already exists.
    Duplicate,
    /// Persisted stock is exhausted.
    OutOfStock,
}

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<VoucherOrder>> {
        let order = sqlx::query_as::<_, VoucherOrder>(
            r#"
            SELECT id, user_id, voucher_id, created_at
            FROM voucher_orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Finds the order a user placed for a voucher, if any.
    pub async fn find_by_user_and_voucher(
        &self,
        user_id: i64,
        voucher_id: i64,
    ) -> DbResult<Option<VoucherOrder>> {
        let mut conn = self.pool.acquire().await?;
        find_on(&mut conn, user_id, voucher_id).await
    }

    /// Inserts an order row as-is.
    pub async fn insert(&self, order: &VoucherOrder) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_on(&mut conn, order).await
    }

    /// Number of orders stored for a voucher.
    pub async fn count_by_voucher(&self, voucher_id: i64) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM voucher_orders WHERE voucher_id = ?1")
                .bind(voucher_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Re-checks, decrements persisted stock and writes the order, atomically.
    pub async fn place_order(&self, order: &VoucherOrder) -> DbResult<PlaceOrderOutcome> {
        let mut tx = self.pool.begin().await?;

        if find_on(&mut tx, order.user_id, order.voucher_id)
            .await?
            .is_some()
        {
            debug!(order_id = order.id, user_id = order.user_id, "Order already exists");
            return Ok(PlaceOrderOutcome::Duplicate);
        }

        if decrement_stock_on(&mut tx, order.voucher_id).await? == 0 {
            debug!(voucher_id = order.voucher_id, "Persisted stock exhausted");
            return Ok(PlaceOrderOutcome::OutOfStock);
        }

        match insert_on(&mut tx, order).await {
            Ok(()) => {}
            // Dropping the transaction rolls the decrement back
            Err(e) if e.is_unique_violation() => return Ok(PlaceOrderOutcome::Duplicate),
            Err(e) => return Err(e),
        }

        tx.commit().await?;
        Ok(PlaceOrderOutcome::Created)
    }
}

async fn find_on(
    conn: &mut SqliteConnection,
    user_id: i64,
    voucher_id: i64,
) -> DbResult<Option<VoucherOrder>> {
    let order = sqlx::query_as::<_, VoucherOrder>(
        r#"
        SELECT id, user_id, voucher_id, created_at
        FROM voucher_orders
        WHERE user_id = ?1 AND voucher_id = ?2
        "#,
    )
    .bind(user_id)
    .bind(voucher_id)
    .fetch_optional(conn)
    .await?;

    Ok(order)
}

async fn insert_on(conn: &mut SqliteConnection, order: &VoucherOrder) -> DbResult<()> {
    debug!(order_id = order.id, user_id = order.user_id, voucher_id = order.voucher_id, "Inserting order");

    sqlx::query(
        r#"
        INSERT INTO voucher_orders (id, user_id, voucher_id, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(order.voucher_id)
    .bind(order.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use chrono::{Duration, Utc};
    use seckill_core::Voucher;

    async fn db_with_voucher(voucher_id: i64, stock: i64) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let begin = Utc::now();
        db.vouchers()
            .upsert(&Voucher {
                id: voucher_id,
                stock,
                begin_time: begin,
                end_time: begin + Duration::hours(2),
            })
            .await
            .unwrap();
        db
    }

    fn order(id: i64, user_id: i64, voucher_id: i64) -> VoucherOrder {
        VoucherOrder {
            id,
            user_id,
            voucher_id,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_place_order_creates_and_decrements() {
        let db = db_with_voucher(1, 5).await;

        let outcome = db.orders().place_order(&order(100, 7, 1)).await.unwrap();
        assert_eq!(outcome, PlaceOrderOutcome::Created);

        let stored = db.orders().get_by_id(100).await.unwrap().unwrap();
        assert_eq!(stored.user_id, 7);
        assert_eq!(db.vouchers().get_by_id(1).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_place_order_twice_is_idempotent() {
        let db = db_with_voucher(1, 5).await;
        let o = order(100, 7, 1);

        assert_eq!(db.orders().place_order(&o).await.unwrap(), PlaceOrderOutcome::Created);
        assert_eq!(db.orders().place_order(&o).await.unwrap(), PlaceOrderOutcome::Duplicate);

        assert_eq!(db.orders().count_by_voucher(1).await.unwrap(), 1);
        assert_eq!(db.vouchers().get_by_id(1).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_place_order_out_of_stock_writes_nothing() {
        let db = db_with_voucher(1, 0).await;

        let outcome = db.orders().place_order(&order(100, 7, 1)).await.unwrap();
        assert_eq!(outcome, PlaceOrderOutcome::OutOfStock);
        assert!(db.orders().get_by_id(100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reused_order_id_rolls_back_decrement() {
        let db = db_with_voucher(1, 5).await;
        db.orders().place_order(&order(100, 7, 1)).await.unwrap();

        // Different user, same order id: primary key conflict
        let outcome = db.orders().place_order(&order(100, 8, 1)).await.unwrap();
        assert_eq!(outcome, PlaceOrderOutcome::Duplicate);
        assert_eq!(db.vouchers().get_by_id(1).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_unique_index_rejects_second_row() {
        let db = db_with_voucher(1, 5).await;
        db.orders().insert(&order(1, 7, 1)).await.unwrap();

        let err = db.orders().insert(&order(2, 7, 1)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let found = db.orders().find_by_user_and_voucher(7, 1).await.unwrap();
        assert_eq!(found.map(|o| o.id), Some(1));
    }
}
