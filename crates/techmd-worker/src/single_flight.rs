use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedMutexGuard};

/// One async lock per druid, so generation for the same druid never overlaps.
///
/// Locks are created on demand and forgotten once no task holds or waits on them.
#[derive(Clone, Default)]
pub struct DruidLocks {
    locks: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
    released: Arc<Notify>,
}

/// Held for as long as a druid's generation runs. Dropping it wakes
/// everything waiting in [`DruidLocks::released`].
pub struct DruidGuard {
    guard: Option<OwnedMutexGuard<()>>,
    released: Arc<Notify>,
}

impl Drop for DruidGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.released.notify_waiters();
    }
}

impl DruidLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, druid: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| lock.strong_count() > 0);
        match locks.get(druid).and_then(Weak::upgrade) {
            Some(lock) => lock,
            None => {
                let lock = Arc::new(AsyncMutex::new(()));
                locks.insert(druid.to_string(), Arc::downgrade(&lock));
                lock
            }
        }
    }

    fn guard(&self, guard: OwnedMutexGuard<()>) -> DruidGuard {
        DruidGuard {
            guard: Some(guard),
            released: self.released.clone(),
        }
    }

    pub async fn lock(&self, druid: &str) -> DruidGuard {
        let guard = self.entry(druid).lock_owned().await;
        self.guard(guard)
    }

    /// `None` while another task holds the druid.
    pub fn try_lock(&self, druid: &str) -> Option<DruidGuard> {
        let guard = self.entry(druid).try_lock_owned().ok()?;
        Some(self.guard(guard))
    }

    /// Notified whenever any druid is released.
    pub fn released(&self) -> Arc<Notify> {
        self.released.clone()
    }

    /// Druids with a live lock.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}
