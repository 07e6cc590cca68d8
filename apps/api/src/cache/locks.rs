//! Per-fingerprint single-flight locks.
//!
//! Runs for the same fingerprint hold the same async mutex for the whole of
//! lookup → execute → persist, so at most one generation happens per
//! fingerprint; later runs wake up to a warm cache. Map entries are removed
//! once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::flow::fingerprint::Fingerprint;

type LockMap = HashMap<Fingerprint, Arc<AsyncMutex<()>>>;

#[derive(Default, Clone)]
pub struct FingerprintLocks {
    inner: Arc<Mutex<LockMap>>,
}

impl FingerprintLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, fingerprint: &Fingerprint) -> FingerprintGuard {
        let lock = Arc::clone(self.inner.lock().entry(fingerprint.clone()).or_default());
        // Registered before waiting, so a waiter dropped mid-await still cleans up.
        let slot = Slot {
            fingerprint: fingerprint.clone(),
            map: Arc::clone(&self.inner),
            lock: Some(Arc::clone(&lock)),
        };
        let guard = lock.lock_owned().await;
        FingerprintGuard { _guard: guard, _slot: slot }
    }

    /// Fingerprints currently locked or awaited.
    pub fn active(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Holds the fingerprint lock. Releases the mutex before leaving the map.
pub struct FingerprintGuard {
    _guard: OwnedMutexGuard<()>,
    _slot: Slot,
}

/// One holder's or waiter's share of a map entry.
struct Slot {
    fingerprint: Fingerprint,
    map: Arc<Mutex<LockMap>>,
    lock: Option<Arc<AsyncMutex<()>>>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let mut map = self.map.lock();
        let Some(lock) = self.lock.take() else { return };
        // Two references left: the map's and ours. Nobody else holds or waits.
        // Ours is released under the map lock so concurrent drops see each other.
        if map.get(&self.fingerprint).is_some_and(|entry| Arc::ptr_eq(entry, &lock))
            && Arc::strong_count(&lock) == 2
        {
            map.remove(&self.fingerprint);
        }
        drop(lock);
    }
}
