//! Per-record mutual exclusion
//!
//! Chunk appends for one record must not interleave. Locks are held in sharded maps keyed by
//! record id; a map only keeps a weak reference, so an entry dies with its last guard and is
//! pruned the next time its shard grows.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

const DEFAULT_SHARD_COUNT: usize = 16;

type Shard = Arc<Mutex<HashMap<Uuid, Weak<Mutex<()>>>>>;

#[derive(Clone)]
pub struct KeyedLocks {
    shards: Vec<Shard>,
}

/// Held while the record is being modified.
pub struct KeyedLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARD_COUNT)
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shards(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self { shards }
    }

    fn shard_index(&self, key: &Uuid) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: Uuid) -> KeyedLockGuard {
        let lock = {
            let mut shard = self.shards[self.shard_index(&key)].lock().await;
            match shard.get(&key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    shard.retain(|_, entry| entry.strong_count() > 0);
                    let lock = Arc::new(Mutex::new(()));
                    shard.insert(key, Arc::downgrade(&lock));
                    lock
                }
            }
        };

        KeyedLockGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of keys with a live lock.
    #[cfg(test)]
    async fn active_keys(&self) -> usize {
        let mut count = 0;
        for shard in &self.shards {
            count += shard
                .lock()
                .await
                .values()
                .filter(|entry| entry.strong_count() > 0)
                .count();
        }
        count
    }
}
