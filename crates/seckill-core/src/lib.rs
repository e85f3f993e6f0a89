//! # seckill-core: Pure Domain Logic for Flash Sales
//!
//! Types and rules shared by every layer of the seckill pipeline. Nothing in
//! this crate touches a socket, a file or a clock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Seckill Order Pipeline                           │
//! │                                                                         │
//! │  seckill_voucher(voucher_id, user_id)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Admission script (seckill-cache)  ──► AdmissionCode 0 / 1 / 2  │   │
//! │  └───────────────────────────────┬─────────────────────────────────┘   │
//! │                                  │ PurchaseIntent (stream.orders)      │
//! │                                  ▼                                      │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Order worker (seckill-order) ──► VoucherOrder (seckill-db)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ★ seckill-core (THIS CRATE) ★ defines every type crossing the arrows  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `Voucher`, `VoucherOrder`, `PurchaseIntent`
//! - [`admission`] - Admission script result codes and business rejections
//! - [`id`] - Bit layout of time-ordered 64-bit order ids
//! - [`error`] - Domain error types

pub mod admission;
pub mod error;
pub mod id;
pub mod types;

pub use admission::{AdmissionCode, Rejection};
pub use error::{CoreError, CoreResult};
pub use types::*;

/// Business tag used when generating order ids.
pub const ORDER_ID_TAG: &str = "order";
