//! # seckill-cache: Shared Key-Value Store Primitives
//!
//! The fast path of a flash sale never touches the database. Everything it
//! needs lives in the shared key-value store and is built here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Seckill Data Flow                                │
//! │                                                                         │
//! │  VoucherOrderService::seckill_voucher          OrderWorker              │
//! │       │                                             │                   │
//! │       ▼                                             ▼                   │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   seckill-cache (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   IdWorker ──► AdmissionGate ──XADD──► IntentQueue              │   │
//! │  │                                         DistributedLock         │   │
//! │  │                         │                                       │   │
//! │  │                         ▼                                       │   │
//! │  │               Arc<dyn CacheStore>                               │   │
//! │  │            RedisStore │ MemoryStore                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Namespace
//! | Key | Type | Written by |
//! |-----|------|------------|
//! | `seckill:stock:<voucher>` | string int | provisioning, admission |
//! | `seckill:order:<voucher>` | set of user ids | admission |
//! | `stream.orders` | stream | admission |
//! | `lock:order:<user>` | string token, leased | materializer |
//! | `icr:<tag>:<yyyy:MM:dd>` | counter, ~2 day TTL | id worker |

pub mod admission;
pub mod error;
pub mod id_worker;
pub mod lock;
pub mod memory;
pub mod queue;
pub mod redis_store;
pub mod store;

pub use admission::{records_key, stock_key, AdmissionGate, AdmissionKeys};
pub use error::{CacheError, CacheResult};
pub use id_worker::IdWorker;
pub use lock::{DistributedLock, LockGuard};
pub use memory::MemoryStore;
pub use queue::IntentQueue;
pub use redis_store::RedisStore;
pub use store::{CacheStore, CounterTick, ReadCursor, StreamEntry};
