//! # Redis Backend
//!
//! [`CacheStore`] over a Redis `ConnectionManager` (multiplexed, reconnects
//! on its own). The admission and unlock scripts are loaded from `lua/` at
//! compile time and invoked with `EVALSHA`, falling back to `EVAL` on a
//! script-cache miss.
//!
//! A blocking `XREADGROUP` occupies the multiplexed connection until it
//! returns. The worker loop issues its other commands between reads, so one
//! store per worker is enough; request-path callers should not share the
//! worker's store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client, RedisResult, Script};
use tracing::{debug, info};

use crate::admission::AdmissionKeys;
use crate::error::{CacheError, CacheResult};
use crate::store::{CacheStore, CounterTick, ReadCursor, StreamEntry};
use seckill_core::PurchaseIntent;

const ADMISSION_SCRIPT: &str = include_str!("../lua/seckill.lua");
const UNLOCK_SCRIPT: &str = include_str!("../lua/unlock.lua");

/// Redis-backed [`CacheStore`].
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    admission: Script,
    unlock: Script,
}

impl RedisStore {
    /// Opens a managed connection to `url` (`redis://host:port/db`).
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = Client::open(url).map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        let conn = ConnectionManager::new(client).await?;

        info!("Connected to Redis");
        Ok(Self::with_connection(conn))
    }

    /// Wraps an existing connection manager.
    pub fn with_connection(conn: ConnectionManager) -> Self {
        RedisStore {
            conn,
            admission: Script::new(ADMISSION_SCRIPT),
            unlock: Script::new(UNLOCK_SCRIPT),
        }
    }
}

fn to_entry(stream_id: StreamId) -> CacheResult<StreamEntry> {
    let mut fields = HashMap::with_capacity(stream_id.map.len());
    for (field, value) in &stream_id.map {
        let value: String = redis::from_redis_value(value)?;
        fields.insert(field.clone(), value);
    }
    Ok(StreamEntry {
        id: stream_id.id,
        fields,
    })
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn admit(&self, keys: &AdmissionKeys, intent: &PurchaseIntent) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .admission
            .key(&keys.stock)
            .key(&keys.records)
            .key(&keys.stream)
            .arg(intent.voucher_id)
            .arg(intent.user_id)
            .arg(intent.order_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(code)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await?;
        Ok(())
    }

    async fn is_member(&self, key: &str, member: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let found: bool = conn.sismember(key, member).await?;
        Ok(found)
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<CounterTick> {
        let mut conn = self.conn.clone();
        // MULTI/EXEC: TIME is read right after this INCR, before any other
        let (value, (secs, micros)): (i64, (i64, u32)) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl.as_secs() as i64)
            .ignore()
            .cmd("TIME")
            .query_async(&mut conn)
            .await?;

        let at = DateTime::from_timestamp(secs, micros * 1_000)
            .ok_or_else(|| CacheError::UnexpectedReply(format!("invalid TIME reply: {secs}")))?;
        Ok(CounterTick { value, at })
    }

    async fn set_if_absent(&self, key: &str, value: &str, lease: Duration) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .unlock
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn create_group(&self, stream: &str, group: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let result: RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;

        match result {
            Ok(()) => {
                info!(stream, group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream, group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        count: usize,
        block: Option<Duration>,
    ) -> CacheResult<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();

        let mut options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);
        if let (ReadCursor::New, Some(block)) = (cursor, block) {
            options = options.block(block.as_millis() as usize);
        }

        // Nil on block timeout
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[stream], &[cursor.as_arg()], &options)
            .await?;

        reply
            .map(|r| r.keys)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|key| key.ids)
            .map(to_entry)
            .collect()
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> CacheResult<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                stream,
                group,
                consumer,
                min_idle.as_millis() as u64,
                "0-0",
                StreamAutoClaimOptions::default().count(count),
            )
            .await?;

        if !reply.deleted_ids.is_empty() {
            debug!(stream, dropped = reply.deleted_ids.len(), "Pending entries no longer in stream");
        }
        reply.claimed.into_iter().map(to_entry).collect()
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> CacheResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let acked: u64 = conn.xack(stream, group, ids).await?;
        Ok(acked)
    }
}

// =============================================================================
// Integration Tests
// =============================================================================
//
// Run against a live server with
// `SECKILL_TEST_REDIS_URL=redis://127.0.0.1:6379 cargo test -p seckill-cache`.
// Without the variable each test returns early. Every test works on its own
// voucher id and stream name and deletes them afterwards.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{records_key, stock_key, AdmissionGate};
    use crate::id_worker::IdWorker;
    use crate::lock::DistributedLock;
    use crate::queue::IntentQueue;
    use seckill_core::{id, AdmissionCode};
    use std::sync::Arc;
    use uuid::Uuid;

    struct Scratch {
        store: Arc<RedisStore>,
        voucher_id: i64,
        stream: String,
    }

    impl Scratch {
        async fn open() -> Option<Self> {
            let url = std::env::var("SECKILL_TEST_REDIS_URL").ok()?;
            let store = RedisStore::connect(&url).await.unwrap();
            let tag = Uuid::new_v4();
            Some(Scratch {
                store: Arc::new(store),
                voucher_id: (tag.as_u128() >> 80) as i64,
                stream: format!("test.orders.{tag}"),
            })
        }

        fn gate(&self) -> AdmissionGate {
            AdmissionGate::new(self.store.clone(), self.stream.clone())
        }

        fn queue(&self, consumer: &str) -> IntentQueue {
            IntentQueue::new(self.store.clone(), self.stream.clone(), "g1", consumer)
        }

        async fn cleanup(self) {
            self.store
                .delete(&[
                    stock_key(self.voucher_id),
                    records_key(self.voucher_id),
                    self.stream.clone(),
                ])
                .await
                .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_script_gives_last_unit_to_one_of_two_users() {
        let Some(scratch) = Scratch::open().await else {
            return;
        };
        let gate = scratch.gate();
        let voucher = scratch.voucher_id;
        gate.load_stock(voucher, 1).await.unwrap();

        let a = tokio::spawn({
            let gate = gate.clone();
            async move { gate.admit(&PurchaseIntent::new(100, 7, voucher)).await }
        });
        let b = tokio::spawn({
            let gate = gate.clone();
            async move { gate.admit(&PurchaseIntent::new(101, 8, voucher)).await }
        });
        let mut codes = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        codes.sort_by_key(|c| c.code());

        assert_eq!(codes, vec![AdmissionCode::Admitted, AdmissionCode::NoStock]);
        assert_eq!(gate.remaining_stock(voucher).await.unwrap(), Some(0));

        scratch.cleanup().await;
    }

    #[tokio::test]
    async fn test_script_rejects_repeat_purchase() {
        let Some(scratch) = Scratch::open().await else {
            return;
        };
        let gate = scratch.gate();
        let voucher = scratch.voucher_id;
        gate.load_stock(voucher, 5).await.unwrap();

        let first = gate.admit(&PurchaseIntent::new(100, 7, voucher)).await.unwrap();
        let second = gate.admit(&PurchaseIntent::new(101, 7, voucher)).await.unwrap();

        assert_eq!(first, AdmissionCode::Admitted);
        assert_eq!(second, AdmissionCode::DuplicateOrder);
        assert_eq!(gate.remaining_stock(voucher).await.unwrap(), Some(4));
        assert!(gate.has_purchased(voucher, 7).await.unwrap());

        scratch.cleanup().await;
    }

    #[tokio::test]
    async fn test_script_treats_missing_or_garbled_stock_as_sold_out() {
        let Some(scratch) = Scratch::open().await else {
            return;
        };
        let gate = scratch.gate();
        let voucher = scratch.voucher_id;

        let missing = gate.admit(&PurchaseIntent::new(100, 7, voucher)).await.unwrap();
        scratch.store.set(&stock_key(voucher), "lots").await.unwrap();
        let garbled = gate.admit(&PurchaseIntent::new(101, 7, voucher)).await.unwrap();

        assert_eq!(missing, AdmissionCode::NoStock);
        assert_eq!(garbled, AdmissionCode::NoStock);
        assert!(!gate.has_purchased(voucher, 7).await.unwrap());

        scratch.cleanup().await;
    }

    #[tokio::test]
    async fn test_pending_intent_is_replayed_then_acknowledged() {
        let Some(scratch) = Scratch::open().await else {
            return;
        };
        let gate = scratch.gate();
        let voucher = scratch.voucher_id;
        let queue = scratch.queue("c1");
        queue.ensure_group().await.unwrap();
        // BUSYGROUP is tolerated
        queue.ensure_group().await.unwrap();

        gate.load_stock(voucher, 5).await.unwrap();
        gate.admit(&PurchaseIntent::new(100, 7, voucher)).await.unwrap();

        let delivered = queue.read_new(Duration::from_millis(100)).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(
            PurchaseIntent::from_fields(&delivered[0].fields).unwrap(),
            PurchaseIntent::new(100, 7, voucher)
        );

        let restarted = scratch.queue("c1");
        assert!(restarted
            .read_new(Duration::from_millis(100))
            .await
            .unwrap()
            .is_empty());
        let pending = restarted.read_pending(10).await.unwrap();
        assert_eq!(pending, delivered);

        restarted.ack(&pending[0].id).await.unwrap();
        assert!(restarted.read_pending(10).await.unwrap().is_empty());

        scratch.cleanup().await;
    }

    #[tokio::test]
    async fn test_idle_entry_is_claimed_by_another_consumer() {
        let Some(scratch) = Scratch::open().await else {
            return;
        };
        let gate = scratch.gate();
        let voucher = scratch.voucher_id;
        let retired = scratch.queue("c-retired");
        retired.ensure_group().await.unwrap();

        gate.load_stock(voucher, 5).await.unwrap();
        gate.admit(&PurchaseIntent::new(100, 7, voucher)).await.unwrap();
        let delivered = retired.read_new(Duration::from_millis(100)).await.unwrap();

        let survivor = scratch.queue("c1");
        assert!(survivor
            .claim_idle(Duration::from_secs(60), 10)
            .await
            .unwrap()
            .is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let claimed = survivor
            .claim_idle(Duration::from_millis(20), 10)
            .await
            .unwrap();
        assert_eq!(claimed, delivered);
        assert_eq!(survivor.read_pending(10).await.unwrap(), delivered);
        assert!(retired.read_pending(10).await.unwrap().is_empty());

        scratch.cleanup().await;
    }

    #[tokio::test]
    async fn test_unlock_script_only_releases_own_token() {
        let Some(scratch) = Scratch::open().await else {
            return;
        };
        let lock = DistributedLock::new(scratch.store.clone(), Duration::from_secs(5));
        let name = format!("order:{}", scratch.voucher_id);

        let guard = lock.try_acquire(&name).await.unwrap().unwrap();
        assert!(lock.try_acquire(&name).await.unwrap().is_none());
        assert!(!scratch
            .store
            .delete_if_equals(guard.key(), "someone-else")
            .await
            .unwrap());

        assert!(guard.release().await.unwrap());
        let again = lock.try_acquire(&name).await.unwrap().unwrap();
        assert!(again.release().await.unwrap());

        scratch.cleanup().await;
    }

    #[tokio::test]
    async fn test_counter_tick_uses_server_clock() {
        let Some(scratch) = Scratch::open().await else {
            return;
        };
        let worker = IdWorker::new(scratch.store.clone());
        let tag = format!("test-{}", scratch.voucher_id);

        let first = worker.next_id(&tag).await.unwrap();
        let second = worker.next_id(&tag).await.unwrap();

        assert!(second > first);
        assert_eq!(id::decompose(second).1, id::decompose(first).1 + 1);

        let key = id::counter_key(&tag, chrono::Utc::now());
        scratch.store.delete(&[key]).await.unwrap();
        scratch.cleanup().await;
    }
}
