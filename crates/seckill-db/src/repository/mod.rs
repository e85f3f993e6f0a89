//! # Repository Module
//!
//! SQL lives here and nowhere else.
//!
//! - [`VoucherRepository`](voucher::VoucherRepository) - voucher rows and the conditional stock decrement
//! - [`OrderRepository`](order::OrderRepository) - order rows and the transactional `place_order`

pub mod order;
pub mod voucher;
