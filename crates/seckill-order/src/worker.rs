//! # Order Worker
//!
//! The one long-lived consumer task per process. It moves intents from the
//! stream into the materializer and acknowledges them once they are settled.
//!
//! ## Loop Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  start                                                                  │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  RECOVERY ◄──────────────────────────────────────────────┐             │
//! │    read_pending(1)            (offset 0, no blocking)     │             │
//! │      └── empty ──► claim_idle(1)  (other consumers)       │             │
//! │      ├── empty ──────────────────────► INTAKE             │             │
//! │      ├── entry ──► process ──► again                      │             │
//! │      └── error ──► sleep(backoff, doubling) ──► again     │             │
//! │                                                           │             │
//! │  INTAKE                                                   │             │
//! │    read_new(block)            (">", COUNT 1, BLOCK ms)    │             │
//! │      ├── empty ───────────────────────────────────────────┤             │
//! │      ├── entry ──► process ──┬── ok ──► again             │             │
//! │      │                       └── failed ──────────────────┤             │
//! │      └── error ───────────────────────────────────────────┘             │
//! │                                                                         │
//! │  shutdown signal ──► stop between iterations or during a backoff        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Acknowledgement Policy
//! | Materialization result | Ack? |
//! |------------------------|------|
//! | Created / AlreadyExists / OutOfStock | yes |
//! | Lock busy, retryable store failure | never, replayed by recovery |
//! | Undecodable entry, non-retryable failure | yes, logged at error |
//!
//! An admitted intent is never dropped while it could still be written: a
//! storage outage only stretches the backoff, up to its ceiling.
//!
//! Startup begins in RECOVERY so a restarted worker replays what its
//! predecessor (same consumer name) left unacknowledged. An idle intake pass
//! also runs RECOVERY, which is when entries stranded under other consumer
//! names are claimed.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::QueueSettings;
use crate::error::{SeckillError, SeckillResult};
use crate::materializer::OrderMaterializer;
use seckill_cache::{CacheResult, IntentQueue, StreamEntry};
use seckill_core::PurchaseIntent;

// =============================================================================
// Handle
// =============================================================================

/// Controls a running [`OrderWorker`].
///
/// Dropping the handle also stops the worker.
pub struct OrderWorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl OrderWorkerHandle {
    /// Signals shutdown and waits for the loop to exit. An entry being
    /// processed is finished first.
    pub async fn shutdown(self) -> SeckillResult<()> {
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|e| SeckillError::Internal(format!("order worker task failed: {e}")))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Consumer loop feeding the materializer.
pub struct OrderWorker {
    queue: IntentQueue,
    materializer: OrderMaterializer,
    block: Duration,
    recovery_backoff: Duration,
    max_recovery_backoff: Duration,
    claim_idle: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl OrderWorker {
    /// Ensures the consumer group exists, then starts the loop on the
    /// current runtime.
    pub async fn spawn(
        queue: IntentQueue,
        materializer: OrderMaterializer,
        settings: &QueueSettings,
    ) -> SeckillResult<OrderWorkerHandle> {
        queue.ensure_group().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = OrderWorker {
            queue,
            materializer,
            block: settings.block(),
            recovery_backoff: settings.recovery_backoff(),
            max_recovery_backoff: settings.max_recovery_backoff(),
            claim_idle: settings.claim_idle(),
            shutdown_rx,
        };

        let task = tokio::spawn(worker.run());
        Ok(OrderWorkerHandle { shutdown_tx, task })
    }

    async fn run(mut self) {
        info!(
            stream = self.queue.stream(),
            group = self.queue.group(),
            consumer = self.queue.consumer(),
            "Order worker starting"
        );

        self.recover().await;

        while !self.is_shutting_down() {
            let read = tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => break,
                read = self.queue.read_new(self.block) => read,
            };

            let entries = match read {
                Ok(entries) => entries,
                Err(e) => {
                    error!(error = %e, "Failed to read intent stream");
                    self.recover().await;
                    continue;
                }
            };

            if entries.is_empty() {
                self.recover().await;
                continue;
            }

            for entry in entries {
                if let Err(e) = self.process(entry).await {
                    warn!(error = %e, "Intent not settled, entering recovery");
                    self.recover().await;
                }
            }
        }

        info!(consumer = self.queue.consumer(), "Order worker stopped");
    }

    /// Replays unsettled entries until none are left.
    async fn recover(&mut self) {
        debug!(consumer = self.queue.consumer(), "Replaying pending intents");
        let mut backoff = self.create_backoff();

        while !self.is_shutting_down() {
            let entries = match self.next_unsettled().await {
                Ok(entries) => entries,
                Err(e) => {
                    error!(error = %e, "Failed to read pending intents");
                    self.pause(&mut backoff).await;
                    continue;
                }
            };

            if entries.is_empty() {
                debug!("Pending intents drained");
                return;
            }

            for entry in entries {
                match self.process(entry).await {
                    Ok(()) => backoff.reset(),
                    Err(e) => {
                        warn!(error = %e, "Pending intent not settled, retrying");
                        self.pause(&mut backoff).await;
                    }
                }
            }
        }
    }

    /// This consumer's oldest pending entry, or else one another consumer
    /// has left idle for `claim_idle`.
    async fn next_unsettled(&self) -> CacheResult<Vec<StreamEntry>> {
        let own = self.queue.read_pending(1).await?;
        if !own.is_empty() {
            return Ok(own);
        }

        let claimed = self.queue.claim_idle(self.claim_idle, 1).await?;
        for entry in &claimed {
            info!(entry_id = %entry.id, "Claimed idle intent from another consumer");
        }
        Ok(claimed)
    }

    /// Materializes one entry and acknowledges it unless it should be
    /// delivered again.
    async fn process(&self, entry: StreamEntry) -> SeckillResult<()> {
        let intent = match PurchaseIntent::from_fields(&entry.fields) {
            Ok(intent) => intent,
            Err(e) => {
                error!(entry_id = %entry.id, error = %e, "Discarding undecodable intent");
                return self.settle(&entry.id).await;
            }
        };

        match self.materializer.materialize(&intent).await {
            Ok(_) => self.settle(&entry.id).await,

            // Stays pending however long the outage lasts
            Err(e) if e.is_retryable() => Err(e),

            Err(e) => {
                error!(
                    entry_id = %entry.id,
                    order_id = intent.order_id,
                    user_id = intent.user_id,
                    voucher_id = intent.voucher_id,
                    error = %e,
                    "Intent cannot be materialized"
                );
                self.settle(&entry.id).await
            }
        }
    }

    async fn settle(&self, entry_id: &str) -> SeckillResult<()> {
        self.queue.ack(entry_id).await?;
        debug!(entry_id, "Intent acknowledged");
        Ok(())
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.recovery_backoff,
            initial_interval: self.recovery_backoff,
            max_interval: self.max_recovery_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // Never give up on an admitted intent
            ..Default::default()
        }
    }

    /// Sleeps for the next backoff step, or until shutdown.
    async fn pause(&mut self, backoff: &mut ExponentialBackoff) {
        let delay = backoff.next_backoff().unwrap_or(self.max_recovery_backoff);
        debug!(?delay, "Backing off before next recovery attempt");

        tokio::select! {
            biased;
            _ = self.shutdown_rx.changed() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// True once shutdown was requested or the handle was dropped.
    fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow() || self.shutdown_rx.has_changed().is_err()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
