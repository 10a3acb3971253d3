//! Keyed in-memory entry store with per-key refresh slots

use crate::types::CacheEntry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// An individual entry slot (optionally contains a cached entry)
///
/// Holding the slot lock for a whole refresh makes concurrent callers on
/// the same key wait for that refresh instead of issuing their own.
pub type EntrySlot<V> = Arc<Mutex<Option<CacheEntry<V>>>>;

struct SlotHandle<V> {
    slot: EntrySlot<V>,
    last_access: AtomicU64,
}

/// Map of key to entry slot, optionally bounded with least-recently-used eviction
pub struct EntryStore<K, V> {
    slots: RwLock<HashMap<K, Arc<SlotHandle<V>>>>,
    capacity: Option<usize>,
    tick: AtomicU64,
}

impl<K, V> EntryStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an unbounded store
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            capacity: None,
            tick: AtomicU64::new(0),
        }
    }

    /// Creates a store that keeps at most `capacity` keys
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    /// Returns the slot for `key`, creating it if needed
    ///
    /// Callers hand the slot back through [`EntryStore::settle`] once their
    /// refresh is done.
    pub async fn slot(&self, key: &K) -> EntrySlot<V> {
        let stamp = self.tick.fetch_add(1, Ordering::Relaxed);

        {
            let slots = self.slots.read().await;
            if let Some(handle) = slots.get(key) {
                handle.last_access.store(stamp, Ordering::Relaxed);
                return handle.slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        let handle = slots.entry(key.clone()).or_insert_with(|| {
            Arc::new(SlotHandle {
                slot: Arc::new(Mutex::new(None)),
                last_access: AtomicU64::new(stamp),
            })
        });
        handle.last_access.store(stamp, Ordering::Relaxed);
        handle.slot.clone()
    }

    /// Finishes a refresh of `key`; the caller must have released the slot lock
    ///
    /// A slot still empty with no other task waiting on it is dropped, so a
    /// failed first fetch does not occupy capacity. Beyond capacity the least
    /// recently accessed idle keys are evicted; slots held by another task
    /// are never evicted.
    pub async fn settle(&self, key: &K, slot: &EntrySlot<V>) {
        let mut slots = self.slots.write().await;

        let ours = slots
            .get(key)
            .is_some_and(|handle| Arc::ptr_eq(&handle.slot, slot));
        // The map and the caller are the only holders
        let idle = Arc::strong_count(slot) == 2;
        let empty = slot.try_lock().map(|entry| entry.is_none()).unwrap_or(false);
        if ours && idle && empty {
            slots.remove(key);
        }

        if let Some(capacity) = self.capacity {
            while slots.len() > capacity {
                let victim = slots
                    .iter()
                    .filter(|(k, h)| *k != key && Arc::strong_count(&h.slot) == 1)
                    .min_by_key(|(_, h)| h.last_access.load(Ordering::Relaxed))
                    .map(|(k, _)| k.clone());
                match victim {
                    Some(victim) => {
                        slots.remove(&victim);
                        tracing::debug!(remaining = slots.len(), "Evicted least recently used entry");
                    }
                    None => break,
                }
            }
        }
    }

    /// Copy of the current entry for `key`, without touching recency
    pub async fn peek(&self, key: &K) -> Option<CacheEntry<V>>
    where
        V: Clone,
    {
        let slot = {
            let slots = self.slots.read().await;
            slots.get(key)?.slot.clone()
        };
        let entry = slot.lock().await;
        entry.as_ref().cloned()
    }

    /// Number of keys currently held
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K, V> Default for EntryStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderId;
    use chrono::Utc;

    async fn put(store: &EntryStore<&'static str, u32>, key: &'static str, value: u32) {
        let slot = store.slot(&key).await;
        *slot.lock().await = Some(CacheEntry::new(value, Utc::now(), ProviderId::CoinGecko));
        store.settle(&key, &slot).await;
    }

    #[tokio::test]
    async fn test_slot_is_shared_per_key() {
        let store: EntryStore<&'static str, u32> = EntryStore::new();
        put(&store, "a", 1).await;

        let again = store.slot(&"a").await;
        assert_eq!(again.lock().await.as_ref().map(|e| e.value), Some(1));
        assert_eq!(store.peek(&"a").await.map(|e| e.value), Some(1));
        assert!(store.peek(&"b").await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_bounded_store_evicts_least_recently_used() {
        let store: EntryStore<&'static str, u32> = EntryStore::bounded(2);
        put(&store, "a", 1).await;
        put(&store, "b", 2).await;

        // Touch "a" so "b" becomes the oldest
        store.slot(&"a").await;
        put(&store, "c", 3).await;

        assert_eq!(store.len().await, 2);
        assert!(store.peek(&"a").await.is_some());
        assert!(store.peek(&"b").await.is_none());
        assert!(store.peek(&"c").await.is_some());
    }

    #[tokio::test]
    async fn test_settle_drops_empty_slot() {
        let store: EntryStore<&'static str, u32> = EntryStore::bounded(1);
        put(&store, "a", 1).await;

        // A refresh of "b" that stored nothing
        let slot = store.slot(&"b").await;
        store.settle(&"b", &slot).await;
        drop(slot);

        assert_eq!(store.len().await, 1);
        assert_eq!(store.peek(&"a").await.map(|e| e.value), Some(1));
    }

    #[tokio::test]
    async fn test_settle_keeps_empty_slot_with_waiters() {
        let store: EntryStore<&'static str, u32> = EntryStore::new();

        let first = store.slot(&"a").await;
        let waiter = store.slot(&"a").await;
        store.settle(&"a", &first).await;

        assert_eq!(store.len().await, 1);
        assert!(Arc::ptr_eq(&store.slot(&"a").await, &waiter));
    }

    #[tokio::test]
    async fn test_busy_slot_is_not_evicted() {
        let store: EntryStore<&'static str, u32> = EntryStore::bounded(1);
        put(&store, "a", 1).await;

        // Another task is mid-refresh on "a"
        let busy = store.slot(&"a").await;
        let guard = busy.lock().await;
        put(&store, "b", 2).await;
        assert_eq!(store.len().await, 2);

        drop(guard);
        drop(busy);
        put(&store, "b", 3).await;
        assert_eq!(store.len().await, 1);
        assert!(store.peek(&"a").await.is_none());
    }
}
