//! # seckill-order: Flash-Sale Ordering
//!
//! Sells a strictly limited voucher to a crowd: never more units than exist,
//! never two to one user, an answer within one store round trip, and no
//! accepted order lost to a worker crash.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Seckill Pipeline                               │
//! │                                                                         │
//! │  buyer ──► VoucherOrderService::seckill_voucher                         │
//! │                 │  IdWorker + AdmissionGate (atomic script)             │
//! │                 │                                                       │
//! │                 ├──► order id / rejection back to buyer (synchronous)   │
//! │                 ▼                                                       │
//! │          stream.orders  (consumer group g1)                             │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │  OrderWorker (one per process)                                          │
//! │     intake loop ◄──► pending recovery loop                              │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │  OrderMaterializer                                                      │
//! │     lock:order:<user> ──► place_order transaction ──► ack               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let config = SeckillConfig::load(None)?;
//! let store: Arc<dyn CacheStore> = Arc::new(RedisStore::connect(&config.redis.url).await?);
//! let db = Database::new(config.db_config()).await?;
//!
//! VoucherService::new(db.clone(), store.clone(), &config)
//!     .add_seckill_voucher(&voucher)
//!     .await?;
//!
//! let order_id = VoucherOrderService::new(store, &config)
//!     .seckill_voucher(voucher.id, user_id)
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod materializer;
pub mod service;
pub mod voucher;
pub mod worker;

pub use config::SeckillConfig;
pub use error::{SeckillError, SeckillResult};
pub use materializer::{MaterializeOutcome, OrderMaterializer};
pub use service::VoucherOrderService;
pub use voucher::VoucherService;
pub use worker::{OrderWorker, OrderWorkerHandle};
