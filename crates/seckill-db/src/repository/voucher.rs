//! # Voucher Repository
//!
//! Persisted voucher rows. Stock only ever moves through
//! [`VoucherRepository::decrement_stock`], a compare-and-swap style update:
//!
//! ```text
//! UPDATE seckill_vouchers SET stock = stock - 1 WHERE id = ? AND stock > 0
//!                                                            ▲
//!                        zero rows affected = sold out ──────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use seckill_core::Voucher;

/// Repository for voucher database operations.
#[derive(Debug, Clone)]
pub struct VoucherRepository {
    pool: SqlitePool,
}

impl VoucherRepository {
    /// Creates a new VoucherRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VoucherRepository { pool }
    }

    /// Inserts a voucher, or replaces stock and sale window of an existing one.
    pub async fn upsert(&self, voucher: &Voucher) -> DbResult<()> {
        debug!(voucher_id = voucher.id, stock = voucher.stock, "Upserting voucher");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO seckill_vouchers (id, stock, begin_time, end_time, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT (id) DO UPDATE SET
                stock = excluded.stock,
                begin_time = excluded.begin_time,
                end_time = excluded.end_time,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(voucher.id)
        .bind(voucher.stock)
        .bind(voucher.begin_time)
        .bind(voucher.end_time)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a voucher by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Voucher>> {
        let voucher = sqlx::query_as::<_, Voucher>(
            r#"
            SELECT id, stock, begin_time, end_time
            FROM seckill_vouchers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    /// Takes one unit of stock if any is left. Returns rows affected (0 or 1).
    pub async fn decrement_stock(&self, voucher_id: i64) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        decrement_stock_on(&mut conn, voucher_id).await
    }
}

/// Conditional decrement on an existing connection or transaction.
pub(crate) async fn decrement_stock_on(
    conn: &mut SqliteConnection,
    voucher_id: i64,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE seckill_vouchers SET
            stock = stock - 1,
            updated_at = ?2
        WHERE id = ?1 AND stock > 0
        "#,
    )
    .bind(voucher_id)
    .bind(Utc::now())
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}
