//! In-process single-writer guard per business.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = HashMap<Uuid, Arc<AsyncMutex<()>>>;

/// Per-business mutexes. An entry lives only while a pass holds or waits on it.
#[derive(Debug, Default)]
pub struct BusinessLocks {
    inner: Arc<Mutex<LockMap>>,
}

/// Held for the duration of one pass. Dropping it releases the business.
#[derive(Debug)]
pub struct BusinessGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl BusinessLocks {
    /// Wait until no other pass holds `business_id`.
    pub async fn acquire(&self, business_id: Uuid) -> BusinessGuard {
        let guard = self.lock_for(business_id).lock_owned().await;
        self.wrap(guard)
    }

    /// Returns `None` when a pass for `business_id` is already running.
    pub fn try_acquire(&self, business_id: Uuid) -> Option<BusinessGuard> {
        let guard = self.lock_for(business_id).try_lock_owned().ok()?;
        Some(self.wrap(guard))
    }

    fn lock_for(&self, business_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(business_id).or_default().clone()
    }

    fn wrap(&self, guard: OwnedMutexGuard<()>) -> BusinessGuard {
        BusinessGuard {
            guard: Some(guard),
            locks: Arc::clone(&self.inner),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

impl Drop for BusinessGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are only taken under the map mutex, so a count of one means nobody holds or waits.
        let mut map = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
