//! # In-Process Backend
//!
//! [`CacheStore`] over plain collections behind one async mutex. Each trait
//! method takes the mutex once, so every operation (admission included) is
//! atomic with respect to every other, the same guarantee Redis gives a
//! single command or script.
//!
//! ## Stream Model
//! ```text
//! stream "stream.orders"
//! ┌──────────┬──────────┬──────────┬──────────┐
//! │ 1000-0   │ 1000-1   │ 1001-0   │ 1002-0   │  entries (append only)
//! └──────────┴──────────┴──────────┴──────────┘
//!                  ▲
//!   group "g1" ────┘ last_delivered
//!   pending: { 1000-1 → (consumer "c1", deliveries 2, last delivered at) }
//! ```
//!
//! Blocking reads park on a [`Notify`] that every append wakes.
//! Key expiry is checked lazily on access.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};

use crate::admission::AdmissionKeys;
use crate::error::{CacheError, CacheResult};
use crate::store::{CacheStore, CounterTick, ReadCursor, StreamEntry};
use seckill_core::{AdmissionCode, PurchaseIntent};

// =============================================================================
// Entry Ids
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
struct EntryId {
    ms: u64,
    seq: u64,
}

impl EntryId {
    fn next_after(last: EntryId) -> EntryId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        if now > last.ms {
            EntryId { ms: now, seq: 0 }
        } else {
            EntryId {
                ms: last.ms,
                seq: last.seq + 1,
            }
        }
    }

    fn parse(raw: &str) -> CacheResult<EntryId> {
        let invalid = || CacheError::UnexpectedReply(format!("invalid stream entry id: {raw}"));
        let (ms, seq) = raw.split_once('-').ok_or_else(invalid)?;
        Ok(EntryId {
            ms: ms.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct StringValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StringValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug)]
struct PendingEntry {
    consumer: String,
    deliveries: u64,
    delivered_at: Instant,
}

#[derive(Debug, Default)]
struct Group {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingEntry>,
}

#[derive(Debug, Default)]
struct Stream {
    entries: BTreeMap<EntryId, HashMap<String, String>>,
    last_id: EntryId,
    groups: HashMap<String, Group>,
}

impl Stream {
    fn append(&mut self, fields: HashMap<String, String>) -> EntryId {
        let id = EntryId::next_after(self.last_id);
        self.last_id = id;
        self.entries.insert(id, fields);
        id
    }
}

#[derive(Debug, Default)]
struct State {
    strings: HashMap<String, StringValue>,
    sets: HashMap<String, HashSet<String>>,
    streams: HashMap<String, Stream>,
}

impl State {
    fn live_string(&mut self, key: &str) -> Option<&mut StringValue> {
        let now = Instant::now();
        if self.strings.get(key).is_some_and(|v| !v.is_live(now)) {
            self.strings.remove(key);
        }
        self.strings.get_mut(key)
    }

    fn parse_int(key: &str, value: &str) -> CacheResult<i64> {
        value.parse().map_err(|_| {
            CacheError::CommandFailed(format!("value at {key} is not an integer"))
        })
    }

    fn read_new(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> CacheResult<Vec<StreamEntry>> {
        let stream_state = self.streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let group_state = stream_state
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        let mut delivered = Vec::new();
        let after = group_state.last_delivered;
        for (id, fields) in stream_state
            .entries
            .iter()
            .filter(|(id, _)| **id > after)
            .take(count)
        {
            group_state.last_delivered = *id;
            group_state.pending.insert(
                *id,
                PendingEntry {
                    consumer: consumer.to_string(),
                    deliveries: 1,
                    delivered_at: Instant::now(),
                },
            );
            delivered.push(StreamEntry {
                id: id.to_string(),
                fields: fields.clone(),
            });
        }

        Ok(delivered)
    }

    fn read_pending(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> CacheResult<Vec<StreamEntry>> {
        let stream_state = self.streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let group_state = stream_state
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        let mut delivered = Vec::new();
        for (id, pending) in group_state
            .pending
            .iter_mut()
            .filter(|(_, p)| p.consumer == consumer)
            .take(count)
        {
            pending.deliveries += 1;
            pending.delivered_at = Instant::now();
            delivered.push(StreamEntry {
                id: id.to_string(),
                fields: stream_state.entries.get(id).cloned().unwrap_or_default(),
            });
        }

        Ok(delivered)
    }

    fn claim_idle(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> CacheResult<Vec<StreamEntry>> {
        let stream_state = self.streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let group_state = stream_state
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        let now = Instant::now();
        let mut claimed = Vec::new();
        let mut vanished = Vec::new();
        for (id, pending) in group_state.pending.iter_mut() {
            if claimed.len() == count {
                break;
            }
            if now.duration_since(pending.delivered_at) < min_idle {
                continue;
            }
            let Some(fields) = stream_state.entries.get(id) else {
                vanished.push(*id);
                continue;
            };
            pending.consumer = consumer.to_string();
            pending.deliveries += 1;
            pending.delivered_at = now;
            claimed.push(StreamEntry {
                id: id.to_string(),
                fields: fields.clone(),
            });
        }

        // XAUTOCLAIM drops pending entries whose stream entry is gone
        for id in vanished {
            group_state.pending.remove(&id);
        }
        Ok(claimed)
    }
}

fn no_group(stream: &str, group: &str) -> CacheError {
    CacheError::CommandFailed(format!(
        "NOGROUP No such key '{stream}' or consumer group '{group}'"
    ))
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process [`CacheStore`] with the same atomicity, lease and
/// consumer-group semantics as the Redis backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    appended: Notify,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries delivered to `group` and not yet acknowledged.
    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        let state = self.state.lock().await;
        state
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Number of entries in a stream.
    pub async fn stream_len(&self, stream: &str) -> usize {
        let state = self.state.lock().await;
        state.streams.get(stream).map_or(0, |s| s.entries.len())
    }

    /// Appends a raw entry to a stream, returning its id. Seeds entries the
    /// admission path would never write.
    pub async fn append(&self, stream: &str, fields: &[(&str, String)]) -> String {
        let mut state = self.state.lock().await;
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let id = state
            .streams
            .entry(stream.to_string())
            .or_default()
            .append(fields);
        drop(state);

        self.appended.notify_waiters();
        id.to_string()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn admit(&self, keys: &AdmissionKeys, intent: &PurchaseIntent) -> CacheResult<i64> {
        let mut state = self.state.lock().await;

        // Missing or non-numeric counters read as sold out, like tonumber()
        let stock = match state
            .live_string(&keys.stock)
            .and_then(|v| v.value.parse::<i64>().ok())
        {
            Some(stock) if stock > 0 => stock,
            _ => return Ok(AdmissionCode::NoStock.code()),
        };

        let user = intent.user_id.to_string();
        if state
            .sets
            .get(&keys.records)
            .is_some_and(|s| s.contains(&user))
        {
            return Ok(AdmissionCode::DuplicateOrder.code());
        }

        if let Some(v) = state.live_string(&keys.stock) {
            v.value = (stock - 1).to_string();
        }
        state.sets.entry(keys.records.clone()).or_default().insert(user);

        let fields = intent
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        state
            .streams
            .entry(keys.stream.clone())
            .or_default()
            .append(fields);
        drop(state);

        self.appended.notify_waiters();
        Ok(AdmissionCode::Admitted.code())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state.live_string(key).map(|v| v.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        state.strings.insert(
            key.to_string(),
            StringValue {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        for key in keys {
            state.strings.remove(key);
            state.sets.remove(key);
            state.streams.remove(key);
        }
        Ok(())
    }

    async fn is_member(&self, key: &str, member: &str) -> CacheResult<bool> {
        let state = self.state.lock().await;
        Ok(state.sets.get(key).is_some_and(|s| s.contains(member)))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<CounterTick> {
        let mut state = self.state.lock().await;
        let at = Utc::now();
        let expires_at = Some(Instant::now() + ttl);

        let next = match state.live_string(key) {
            Some(v) => {
                let next = State::parse_int(key, &v.value)? + 1;
                v.value = next.to_string();
                v.expires_at = expires_at;
                next
            }
            None => {
                state.strings.insert(
                    key.to_string(),
                    StringValue {
                        value: "1".to_string(),
                        expires_at,
                    },
                );
                1
            }
        };

        Ok(CounterTick { value: next, at })
    }

    async fn set_if_absent(&self, key: &str, value: &str, lease: Duration) -> CacheResult<bool> {
        let mut state = self.state.lock().await;
        if state.live_string(key).is_some() {
            return Ok(false);
        }
        state.strings.insert(
            key.to_string(),
            StringValue {
                value: value.to_string(),
                expires_at: Some(Instant::now() + lease),
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool> {
        let mut state = self.state.lock().await;
        match state.live_string(key) {
            Some(v) if v.value == value => {
                state.strings.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_group(&self, stream: &str, group: &str) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        state
            .streams
            .entry(stream.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
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
        if cursor == ReadCursor::Pending {
            let mut state = self.state.lock().await;
            return state.read_pending(stream, group, consumer, count);
        }

        let deadline = block.map(|b| tokio::time::Instant::now() + b);
        loop {
            // Registered before the lock is released so an append in between
            // still wakes this reader.
            let appended = self.appended.notified();
            {
                let mut state = self.state.lock().await;
                let entries = state.read_new(stream, group, consumer, count)?;
                if !entries.is_empty() {
                    return Ok(entries);
                }
            }

            let Some(deadline) = deadline else {
                return Ok(Vec::new());
            };
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> CacheResult<Vec<StreamEntry>> {
        let mut state = self.state.lock().await;
        state.claim_idle(stream, group, consumer, min_idle, count)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> CacheResult<u64> {
        let mut state = self.state.lock().await;
        let Some(group_state) = state
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
        else {
            return Ok(0);
        };

        let mut acked = 0;
        for raw in ids {
            if group_state.pending.remove(&EntryId::parse(raw)?).is_some() {
                acked += 1;
            }
        }
        Ok(acked)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
