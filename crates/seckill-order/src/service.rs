//! # Voucher Order Service
//!
//! The synchronous half of a flash sale.
//!
//! ```text
//! seckill_voucher(voucher, user)
//!     │
//!     ├── IdWorker::next_id("order")            order id
//!     ├── AdmissionGate::admit(intent)          one atomic script
//!     │      ├── 0 ──► Ok(order_id)             intent already on the stream
//!     │      ├── 1 ──► Err(Rejected(NoStock))
//!     │      └── 2 ──► Err(Rejected(DuplicateOrder))
//!     └── store unreachable ──► Err(Cache(..)), nothing admitted
//! ```
//!
//! The order row appears later, written by the worker.

use std::sync::Arc;

use tracing::debug;

use crate::config::SeckillConfig;
use crate::error::{SeckillError, SeckillResult};
use seckill_cache::{AdmissionGate, CacheStore, IdWorker};
use seckill_core::PurchaseIntent;

/// Admission entry point for buyers.
#[derive(Clone)]
pub struct VoucherOrderService {
    ids: IdWorker,
    gate: AdmissionGate,
    order_tag: String,
}

impl VoucherOrderService {
    pub fn new(store: Arc<dyn CacheStore>, config: &SeckillConfig) -> Self {
        VoucherOrderService {
            ids: IdWorker::new(store.clone()),
            gate: AdmissionGate::new(store, config.queue.stream.clone()),
            order_tag: config.ids.order_tag.clone(),
        }
    }

    /// Tries to buy one unit of `voucher_id` for `user_id`.
    ///
    /// Returns the order id as soon as the purchase is admitted.
    pub async fn seckill_voucher(&self, voucher_id: i64, user_id: i64) -> SeckillResult<i64> {
        let order_id = self.ids.next_id(&self.order_tag).await?;
        let intent = PurchaseIntent::new(order_id, user_id, voucher_id);

        let code = self.gate.admit(&intent).await?;
        if let Err(rejection) = code.into_result() {
            debug!(voucher_id, user_id, reason = %rejection, "Purchase rejected");
            return Err(SeckillError::Rejected(rejection));
        }

        debug!(order_id, voucher_id, user_id, "Purchase admitted");
        Ok(order_id)
    }
}
