//! # Key-Value Store Seam
//!
//! The handful of store operations the seckill pipeline needs, behind one
//! trait so the pipeline runs unchanged against Redis in production and an
//! in-process store in tests.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   IdWorker   AdmissionGate   DistributedLock   IntentQueue              │
//! │       │            │                │               │                   │
//! │       └────────────┴───────┬────────┴───────────────┘                   │
//! │                            ▼                                            │
//! │                 Arc<dyn CacheStore>                                     │
//! │                  │                │                                     │
//! │                  ▼                ▼                                     │
//! │            RedisStore        MemoryStore                                │
//! │         (ConnectionManager)  (Mutex + Notify)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method is one atomic step on the store. Nothing composes two calls
//! into a larger atomic unit; anything that must be indivisible (admission,
//! compare-and-delete) is a single method here.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seckill_core::PurchaseIntent;

use crate::admission::AdmissionKeys;
use crate::error::CacheResult;

/// One stream entry as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Entry id assigned by the store (`<ms>-<seq>`).
    pub id: String,
    /// Field/value pairs.
    pub fields: HashMap<String, String>,
}

/// A counter value and the store's clock, read in the same atomic step.
///
/// Ticks of one counter are ordered the same way by `value` and by `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterTick {
    pub value: i64,
    pub at: DateTime<Utc>,
}

/// Where a consumer-group read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCursor {
    /// Entries never delivered to the group (`>`).
    New,
    /// This consumer's delivered-but-unacknowledged entries, from offset `0`.
    Pending,
}

impl ReadCursor {
    /// Id argument for `XREADGROUP`.
    pub fn as_arg(self) -> &'static str {
        match self {
            ReadCursor::New => ">",
            ReadCursor::Pending => "0",
        }
    }
}

/// Operations on the shared key-value store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Runs the admission script for `intent`. Returns the raw code
    /// (0 admitted, 1 no stock, 2 duplicate).
    async fn admit(&self, keys: &AdmissionKeys, intent: &PurchaseIntent) -> CacheResult<i64>;

    /// Reads a string value.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Writes a string value without expiry.
    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Deletes keys of any type. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> CacheResult<()>;

    /// Set membership test.
    async fn is_member(&self, key: &str, member: &str) -> CacheResult<bool>;

    /// Increments a counter, (re)arms its expiry and reads the store clock
    /// in one step.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<CounterTick>;

    /// `SET key value NX PX lease`. Returns true when the key was set.
    async fn set_if_absent(&self, key: &str, value: &str, lease: Duration) -> CacheResult<bool>;

    /// Deletes `key` only if it currently holds `value`.
    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool>;

    /// Creates a consumer group reading from the start of the stream,
    /// creating the stream if needed. An existing group is left untouched.
    async fn create_group(&self, stream: &str, group: &str) -> CacheResult<()>;

    /// Consumer-group read. `block` applies to [`ReadCursor::New`] only;
    /// `None` returns immediately.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        count: usize,
        block: Option<Duration>,
    ) -> CacheResult<Vec<StreamEntry>>;

    /// Moves up to `count` pending entries that no consumer has touched for
    /// `min_idle` to `consumer` and returns them (`XAUTOCLAIM`).
    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> CacheResult<Vec<StreamEntry>>;

    /// Acknowledges entries. Returns how many were pending.
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> CacheResult<u64>;
}
