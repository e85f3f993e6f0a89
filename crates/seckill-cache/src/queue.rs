//! # Durable Intent Queue
//!
//! One consumer's view of the intent stream.
//!
//! ```text
//!                 XADD (inside the admission script)
//!                        │
//!                        ▼
//!   stream.orders ─────────────────────────────────────────►
//!                        │
//!        group g1 ───────┤ last delivered
//!                        │
//!   read_new     XREADGROUP GROUP g1 <consumer> COUNT 1 BLOCK <ms> STREAMS stream.orders >
//!   read_pending XREADGROUP GROUP g1 <consumer> COUNT n STREAMS stream.orders 0
//!   claim_idle   XAUTOCLAIM stream.orders g1 <consumer> <min-idle> 0-0 COUNT n
//!   ack          XACK stream.orders g1 <id>
//! ```
//!
//! Entries stay pending until acknowledged, across consumer restarts. A
//! restarted consumer that reuses its name replays them with `read_pending`;
//! entries owned by a name that never comes back are taken over with
//! `claim_idle`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheResult;
use crate::store::{CacheStore, ReadCursor, StreamEntry};

/// Consumer-group access to the intent stream.
#[derive(Clone)]
pub struct IntentQueue {
    store: Arc<dyn CacheStore>,
    stream: String,
    group: String,
    consumer: String,
}

impl IntentQueue {
    pub fn new(
        store: Arc<dyn CacheStore>,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        IntentQueue {
            store,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Creates the stream and group if missing.
    pub async fn ensure_group(&self) -> CacheResult<()> {
        self.store.create_group(&self.stream, &self.group).await
    }

    /// Next undelivered entry, waiting up to `block`. Empty on timeout.
    pub async fn read_new(&self, block: Duration) -> CacheResult<Vec<StreamEntry>> {
        self.store
            .read_group(
                &self.stream,
                &self.group,
                &self.consumer,
                ReadCursor::New,
                1,
                Some(block),
            )
            .await
    }

    /// Up to `count` of this consumer's unacknowledged entries, oldest first.
    pub async fn read_pending(&self, count: usize) -> CacheResult<Vec<StreamEntry>> {
        self.store
            .read_group(
                &self.stream,
                &self.group,
                &self.consumer,
                ReadCursor::Pending,
                count,
                None,
            )
            .await
    }

    /// Takes over up to `count` entries any consumer has left unacknowledged
    /// for at least `min_idle`. They become this consumer's pending entries.
    pub async fn claim_idle(&self, min_idle: Duration, count: usize) -> CacheResult<Vec<StreamEntry>> {
        self.store
            .claim_idle(&self.stream, &self.group, &self.consumer, min_idle, count)
            .await
    }

    pub async fn ack(&self, entry_id: &str) -> CacheResult<()> {
        self.store
            .ack(&self.stream, &self.group, &[entry_id.to_string()])
            .await?;
        Ok(())
    }
}
