//! `PostgreSQL` system of record for vouchers and orders.
//!
//! This crate provides the durable relational side of the pipeline: voucher
//! metadata reads for the cache-through loader, and the two mutations the
//! materialization worker performs per admitted purchase (conditional stock
//! decrement, idempotent order insert).
//!
//! The schema lives in `migrations/0001_flashsale.sql`.
//!
//! # Example
//!
//! ```no_run
//! use flashsale_postgres::PgSystemOfRecord;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PgSystemOfRecord::connect("postgres://localhost/flashsale").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use flashsale_core::providers::SystemOfRecord;
use flashsale_core::{
    FlashSaleError, OrderId, OrderInsert, Result, UserId, Voucher, VoucherId, VoucherOrder,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Map a sqlx error into the crate taxonomy with an operation label.
fn infra(op: &str, e: &sqlx::Error) -> FlashSaleError {
    FlashSaleError::Infrastructure(format!("{op}: {e}"))
}

/// `PostgreSQL`-backed system of record.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct PgSystemOfRecord {
    pool: PgPool,
}

impl PgSystemOfRecord {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to a database URL with a default pool.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the connection cannot be
    /// established.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| {
                FlashSaleError::Infrastructure(format!("Failed to connect to Postgres: {e}"))
            })?;

        Ok(Self { pool })
    }

    /// Access the underlying pool, for migrations and test setup.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl SystemOfRecord for PgSystemOfRecord {
    async fn get_voucher(&self, voucher_id: VoucherId) -> Result<Option<Voucher>> {
        let row: Option<(i64, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            r"
            SELECT voucher_id, stock, begin_time, end_time
            FROM seckill_vouchers
            WHERE voucher_id = $1
            ",
        )
        .bind(voucher_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| infra("get_voucher", &e))?;

        Ok(row.map(|(id, stock, begin_time, end_time)| Voucher {
            voucher_id: VoucherId(id),
            stock,
            begin_time,
            end_time,
        }))
    }

    async fn decrement_stock(&self, voucher_id: VoucherId) -> Result<bool> {
        // The `stock > 0` predicate serializes concurrent workers: the row
        // lock plus re-evaluated condition means at most `stock` decrements
        // ever succeed.
        let result = sqlx::query(
            r"
            UPDATE seckill_vouchers
            SET stock = stock - 1
            WHERE voucher_id = $1 AND stock > 0
            ",
        )
        .bind(voucher_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| infra("decrement_stock", &e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_order(&self, order: &VoucherOrder) -> Result<OrderInsert> {
        let result = sqlx::query(
            r"
            INSERT INTO voucher_orders (order_id, user_id, voucher_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO NOTHING
            ",
        )
        .bind(order.order_id.0)
        .bind(order.user_id.0)
        .bind(order.voucher_id.0)
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| infra("insert_order", &e))?;

        if result.rows_affected() == 1 {
            Ok(OrderInsert::Inserted)
        } else {
            tracing::debug!(
                order_id = %order.order_id,
                "Order already persisted; treating redelivery as success"
            );
            Ok(OrderInsert::AlreadyExists)
        }
    }
}

/// Query helpers used by operator tooling and tests.
impl PgSystemOfRecord {
    /// Count persisted orders for a voucher.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the query fails.
    pub async fn count_orders(&self, voucher_id: VoucherId) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r"SELECT COUNT(*) FROM voucher_orders WHERE voucher_id = $1",
        )
        .bind(voucher_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| infra("count_orders", &e))?;

        Ok(count.0)
    }

    /// Fetch one order by id, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the query fails.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<VoucherOrder>> {
        let row: Option<(i64, i64, i64, DateTime<Utc>)> = sqlx::query_as(
            r"
            SELECT order_id, user_id, voucher_id, created_at
            FROM voucher_orders
            WHERE order_id = $1
            ",
        )
        .bind(order_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| infra("get_order", &e))?;

        Ok(row.map(|(oid, uid, vid, created_at)| VoucherOrder {
            order_id: OrderId(oid),
            user_id: UserId(uid),
            voucher_id: VoucherId(vid),
            created_at,
        }))
    }

    /// Insert or replace a voucher row, for sale setup.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the upsert fails.
    pub async fn upsert_voucher(&self, voucher: &Voucher) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO seckill_vouchers (voucher_id, stock, begin_time, end_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (voucher_id) DO UPDATE
            SET stock = EXCLUDED.stock,
                begin_time = EXCLUDED.begin_time,
                end_time = EXCLUDED.end_time
            ",
        )
        .bind(voucher.voucher_id.0)
        .bind(voucher.stock)
        .bind(voucher.begin_time)
        .bind(voucher.end_time)
        .execute(&self.pool)
        .await
        .map_err(|e| infra("upsert_voucher", &e))?;

        tracing::info!(voucher_id = %voucher.voucher_id, stock = voucher.stock, "Voucher upserted");
        Ok(())
    }
}
