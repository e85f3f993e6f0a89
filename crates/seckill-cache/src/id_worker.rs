//! # Order Id Worker
//!
//! `next_id(tag)` = seconds since the id epoch in the high bits, a per-tag
//! daily counter from the shared store in the low 32 bits (see
//! [`seckill_core::id`]). The counter is incremented server side, so callers
//! in any number of processes never receive the same id.
//!
//! The seconds come from the store clock read in the same step as the
//! increment, so ids of one tag sort the same way as their counter values.
//! The counter key is picked from the local date; if the store clock is on a
//! different day, the increment is repeated on that day's counter so an id's
//! seconds always fall on the day of the counter that numbered it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use seckill_core::id;
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::store::CacheStore;

/// Lifetime of a daily counter key. Outlives its day so a counter is never
/// recreated while ids from that day can still be issued.
pub const COUNTER_TTL: Duration = Duration::from_secs(2 * 24 * 60 * 60);

const MAX_DAY_RETRIES: usize = 3;

/// Generates globally unique, time-ordered 64-bit ids.
#[derive(Clone)]
pub struct IdWorker {
    store: Arc<dyn CacheStore>,
}

impl IdWorker {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        IdWorker { store }
    }

    /// Next id for `tag`. Fails only when the store is unreachable or the
    /// day's sequence space is used up.
    pub async fn next_id(&self, tag: &str) -> CacheResult<i64> {
        let mut day = Utc::now();
        for _ in 0..MAX_DAY_RETRIES {
            let tick = self
                .store
                .incr_with_ttl(&id::counter_key(tag, day), COUNTER_TTL)
                .await?;

            if tick.at.date_naive() == day.date_naive() {
                return Ok(id::compose(tick.at, tick.value)?);
            }
            debug!(tag, local = %day, store = %tick.at, "Clock day mismatch, retrying on store day");
            day = tick.at;
        }

        Err(CacheError::UnexpectedReply(format!(
            "store clock kept changing day while numbering {tag}"
        )))
    }
}
