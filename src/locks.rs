use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

/// One async mutex per key, created on first use. Holders of different
/// keys never contend.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: Ulid) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard is released before awaiting.
        let mutex = self.locks.entry(key).or_default().value().clone();
        mutex.lock_owned().await
    }

    /// Acquire several keys in sorted order to prevent deadlocks.
    pub async fn lock_many(&self, keys: &[Ulid]) -> Vec<OwnedMutexGuard<()>> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }
}
