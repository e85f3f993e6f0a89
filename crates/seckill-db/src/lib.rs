//! # seckill-db: Relational Storage for Seckill
//!
//! Durable truth for vouchers and orders. The cache-resident counters in
//! seckill-cache gate the rush; this crate is the second safety net that
//! never lets persisted stock go below zero and never stores two orders for
//! the same (user, voucher).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Seckill Data Flow                                │
//! │                                                                         │
//! │  OrderMaterializer (seckill-order)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     seckill-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │◄───│ VoucherRepository  │  │ (embedded) │  │   │
//! │  │   │  SqlitePool   │    │ OrderRepository    │  │ 001_...sql │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seckill_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./seckill.db")).await?;
//! let outcome = db.orders().place_order(&order).await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::order::{OrderRepository, PlaceOrderOutcome};
pub use repository::voucher::VoucherRepository;
