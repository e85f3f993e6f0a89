//! # Distributed Lock
//!
//! Leased, single-attempt mutual exclusion on a store key.
//!
//! ```text
//! try_acquire("order:7")
//!     SET lock:order:7 <token> NX PX <lease>
//!        ├── OK  ──► Some(LockGuard)
//!        └── nil ──► None        (held elsewhere, caller backs off)
//!
//! LockGuard::release() / Drop
//!     if GET lock:order:7 == <token> then DEL   (one script)
//! ```
//!
//! The token is unique per acquisition, so a holder whose lease expired
//! cannot delete a lock someone else has since taken. The lease bounds how
//! long a crashed holder can block others.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CacheResult;
use crate::store::CacheStore;

const KEY_PREFIX: &str = "lock:";

/// Factory for leased locks under the `lock:` namespace.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CacheStore>,
    lease: Duration,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn CacheStore>, lease: Duration) -> Self {
        DistributedLock { store, lease }
    }

    /// Lock name serializing materialization for one user.
    pub fn order_lock_name(user_id: i64) -> String {
        format!("order:{user_id}")
    }

    /// One non-blocking attempt. `None` means someone else holds it.
    pub async fn try_acquire(&self, name: &str) -> CacheResult<Option<LockGuard>> {
        let key = format!("{KEY_PREFIX}{name}");
        let token = Uuid::new_v4().to_string();

        if !self.store.set_if_absent(&key, &token, self.lease).await? {
            debug!(key = %key, "Lock busy");
            return Ok(None);
        }

        debug!(key = %key, "Lock acquired");
        Ok(Some(LockGuard {
            store: self.store.clone(),
            key,
            token,
            released: false,
        }))
    }
}

/// A held lock. Release explicitly with [`LockGuard::release`]; dropping an
/// unreleased guard releases it in the background.
pub struct LockGuard {
    store: Arc<dyn CacheStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock if still owned. Returns false when the lease had
    /// already expired.
    pub async fn release(mut self) -> CacheResult<bool> {
        self.released = true;
        let removed = self.store.delete_if_equals(&self.key, &self.token).await?;
        if !removed {
            warn!(key = %self.key, "Lock lease expired before release");
        }
        Ok(removed)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        // Outside a runtime the lease expiry releases it.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(e) = store.delete_if_equals(&key, &token).await {
                warn!(key = %key, error = %e, "Background lock release failed");
            }
        });
    }
}
