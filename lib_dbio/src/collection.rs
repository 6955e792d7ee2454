//! # Expiring, Bounded Collection
//!
//! A generic key/value store with two optional policies layered on top of an
//! insertion-ordered map:
//!
//! 1. **Idle expiry**: a background sweep removes entries whose time since
//!    last access exceeds `expire`. Reads refresh the access timestamp, so
//!    expiry is idle-based, not insertion-based. The sweep runs on its own
//!    interval; entries are never expired eagerly on read.
//! 2. **Size limit**: inserting a new key into a full collection evicts the
//!    oldest-*inserted* entry. This is deliberately not LRU even though
//!    last-access times are tracked; the tests pin the insertion-order
//!    policy down so a future change to true LRU has to be explicit.
//!
//! Handles are cheap to clone and share one store, so the client facade and
//! the fleet demultiplexer can both hold the same profile cache. The sweeper
//! task holds only a weak reference and exits once every handle is dropped.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

/// Default period between two sweep passes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(5_000);

/// Tuning knobs for a [`Collection`].
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    /// Maximum idle time before an entry is eligible for sweeping.
    /// `None` disables expiry entirely (and no sweeper task is spawned).
    pub expire: Option<Duration>,
    /// Maximum number of entries. `None` means unbounded.
    pub limit: Option<usize>,
    /// Period between sweep passes. Only meaningful with a finite `expire`.
    pub sweep_interval: Duration,
    /// When true (the default), `get` refreshes the entry's last-access
    /// timestamp; when false, only writes refresh it.
    pub reset_on_access: bool,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            expire: None,
            limit: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            reset_on_access: true,
        }
    }
}

struct Store<K, V> {
    /// Entries in insertion order. Re-setting an existing key keeps its slot.
    entries: Vec<(K, V)>,
    /// Last access (read or write) per key, used by the sweeper.
    last_used: HashMap<K, Instant>,
}

impl<K, V> Store<K, V> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            last_used: HashMap::new(),
        }
    }
}

/// An expiring, bounded, insertion-ordered key/value collection.
pub struct Collection<K, V> {
    store: Arc<Mutex<Store<K, V>>>,
    options: CollectionOptions,
}

impl<K, V> Clone for Collection<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            options: self.options.clone(),
        }
    }
}

impl<K, V> Collection<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Creates an empty collection.
    ///
    /// When `options.expire` is finite this spawns the background sweeper
    /// task and therefore must be called from within a tokio runtime.
    pub fn new(options: CollectionOptions) -> Self {
        let collection = Self {
            store: Arc::new(Mutex::new(Store::new())),
            options,
        };
        if let Some(expire) = collection.options.expire {
            let weak = Arc::downgrade(&collection.store);
            let period = collection.options.sweep_interval;
            tokio::spawn(Self::sweeper(weak, period, expire));
        }
        collection
    }

    /// Creates a collection pre-seeded with `entries` (in iteration order).
    pub fn with_entries<I>(entries: I, options: CollectionOptions) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let collection = Self::new(options);
        for (key, value) in entries {
            collection.set(key, value);
        }
        collection
    }

    /// The periodic sweep. Ticks forever; while the collection is empty a
    /// tick is a no-op (the timer is effectively parked, not destroyed).
    /// Exits once every user handle has been dropped.
    async fn sweeper(weak: Weak<Mutex<Store<K, V>>>, period: Duration, expire: Duration) {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; skip it.
        tick.tick().await;
        loop {
            tick.tick().await;
            let Some(store) = weak.upgrade() else { return };
            let mut store = store.lock().expect("collection lock poisoned");
            if store.entries.is_empty() {
                continue;
            }
            let now = Instant::now();
            let last_used = &store.last_used;
            let expired: Vec<K> = store
                .entries
                .iter()
                .filter(|(key, _)| {
                    last_used
                        .get(key)
                        .is_some_and(|used| now.duration_since(*used) > expire)
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                log::trace!("collection: sweeping idle entry");
                store.entries.retain(|(k, _)| *k != key);
                store.last_used.remove(&key);
            }
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.store.lock().expect("collection lock poisoned").entries.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `key` is present. Does not refresh the access timestamp.
    pub fn has(&self, key: &K) -> bool {
        let store = self.store.lock().expect("collection lock poisoned");
        store.entries.iter().any(|(k, _)| k == key)
    }

    /// Returns a clone of the value for `key`, refreshing its last-access
    /// timestamp (unless `reset_on_access` is off). Absence is `None`,
    /// never an error.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut store = self.store.lock().expect("collection lock poisoned");
        let found = store
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone());
        if found.is_some() && self.options.reset_on_access {
            store.last_used.insert(key.clone(), Instant::now());
        }
        found
    }

    /// Inserts or replaces `key`. A replacement keeps the key's original
    /// insertion slot. When the collection is full and `key` is new, the
    /// oldest-inserted entry is evicted first.
    pub fn set(&self, key: K, value: V) {
        let mut store = self.store.lock().expect("collection lock poisoned");
        if let Some(slot) = store.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            if let Some(limit) = self.options.limit {
                if store.entries.len() >= limit && !store.entries.is_empty() {
                    let (oldest, _) = store.entries.remove(0);
                    store.last_used.remove(&oldest);
                }
            }
            store.entries.push((key.clone(), value));
        }
        store.last_used.insert(key, Instant::now());
    }

    /// Removes `key`, reporting whether it was present.
    pub fn delete(&self, key: &K) -> bool {
        let mut store = self.store.lock().expect("collection lock poisoned");
        let before = store.entries.len();
        store.entries.retain(|(k, _)| k != key);
        store.last_used.remove(key);
        store.entries.len() != before
    }

    /// Removes every entry and every access timestamp.
    pub fn clear(&self) {
        let mut store = self.store.lock().expect("collection lock poisoned");
        store.entries.clear();
        store.last_used.clear();
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        let store = self.store.lock().expect("collection lock poisoned");
        store.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Values in insertion order.
    pub fn values(&self) -> Vec<V> {
        let store = self.store.lock().expect("collection lock poisoned");
        store.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    /// `(key, value)` pairs in insertion order.
    pub fn entries(&self) -> Vec<(K, V)> {
        let store = self.store.lock().expect("collection lock poisoned");
        store.entries.clone()
    }

    /// The oldest-inserted value, if any.
    pub fn first(&self) -> Option<V> {
        let store = self.store.lock().expect("collection lock poisoned");
        store.entries.first().map(|(_, v)| v.clone())
    }

    /// Values for which `func(value, key)` returns true, in insertion order.
    pub fn filter<F>(&self, mut func: F) -> Vec<V>
    where
        F: FnMut(&V, &K) -> bool,
    {
        let store = self.store.lock().expect("collection lock poisoned");
        store
            .entries
            .iter()
            .filter(|(k, v)| func(v, k))
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// The first value for which `func(value, key)` returns true.
    pub fn find<F>(&self, mut func: F) -> Option<V>
    where
        F: FnMut(&V, &K) -> bool,
    {
        let store = self.store.lock().expect("collection lock poisoned");
        store
            .entries
            .iter()
            .find(|(k, v)| func(v, k))
            .map(|(_, v)| v.clone())
    }

    /// Maps every `(value, key)` pair through `func`, in insertion order.
    pub fn map<T, F>(&self, mut func: F) -> Vec<T>
    where
        F: FnMut(&V, &K) -> T,
    {
        let store = self.store.lock().expect("collection lock poisoned");
        store.entries.iter().map(|(k, v)| func(v, k)).collect()
    }

    /// Folds the values, in insertion order.
    pub fn reduce<T, F>(&self, initial: T, mut func: F) -> T
    where
        F: FnMut(T, &V) -> T,
    {
        let store = self.store.lock().expect("collection lock poisoned");
        store.entries.iter().fold(initial, |acc, (_, v)| func(acc, v))
    }

    /// True if any `(value, key)` pair satisfies `func`.
    pub fn some<F>(&self, mut func: F) -> bool
    where
        F: FnMut(&V, &K) -> bool,
    {
        let store = self.store.lock().expect("collection lock poisoned");
        store.entries.iter().any(|(k, v)| func(v, k))
    }

    /// Calls `func` for every `(value, key)` pair, in insertion order.
    pub fn for_each<F>(&self, mut func: F)
    where
        F: FnMut(&V, &K),
    {
        let store = self.store.lock().expect("collection lock poisoned");
        for (k, v) in store.entries.iter() {
            func(v, k);
        }
    }

    /// Creates an independent copy of the current contents. The copy gets
    /// its own store and (if configured) its own sweeper.
    pub fn deep_clone(&self) -> Self {
        Self::with_entries(self.entries(), self.options.clone())
    }

    /// The configured idle-expiry duration, if any.
    pub fn expire(&self) -> Option<Duration> {
        self.options.expire
    }

    /// The configured size limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.options.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbounded() -> Collection<String, u32> {
        Collection::new(CollectionOptions::default())
    }

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let cache = unbounded();
        assert!(cache.is_empty());
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a".into()), Some(1));
        assert_eq!(cache.get(&"missing".into()), None);
        assert!(cache.delete(&"a".into()));
        assert!(!cache.delete(&"a".into()));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn eviction_is_insertion_order_not_lru() {
        let cache: Collection<String, u32> = Collection::new(CollectionOptions {
            limit: Some(2),
            ..CollectionOptions::default()
        });
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        // Touch "a" so an LRU policy would evict "b" instead.
        assert_eq!(cache.get(&"a".into()), Some(1));
        cache.set("c".into(), 3);
        assert_eq!(cache.len(), 2);
        // Insertion-order eviction: "a" goes, despite being the most
        // recently read entry.
        assert!(!cache.has(&"a".into()));
        assert!(cache.has(&"b".into()));
        assert!(cache.has(&"c".into()));
    }

    #[tokio::test]
    async fn resetting_a_key_keeps_its_insertion_slot() {
        let cache = unbounded();
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        cache.set("a".into(), 10);
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cache.first(), Some(10));
    }

    #[tokio::test]
    async fn idle_entries_are_swept() {
        let cache: Collection<String, u32> = Collection::new(CollectionOptions {
            expire: Some(Duration::from_millis(100)),
            sweep_interval: Duration::from_millis(50),
            ..CollectionOptions::default()
        });
        cache.set("stale".into(), 1);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!cache.has(&"stale".into()));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn reads_refresh_the_idle_clock() {
        let cache: Collection<String, u32> = Collection::new(CollectionOptions {
            expire: Some(Duration::from_millis(150)),
            sweep_interval: Duration::from_millis(50),
            ..CollectionOptions::default()
        });
        cache.set("hot".into(), 1);
        // Keep reading well inside the expiry window; the entry must survive
        // far longer than `expire` because every read refreshes it.
        for _ in 0..8 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            assert_eq!(cache.get(&"hot".into()), Some(1));
        }
    }

    #[tokio::test]
    async fn expiry_is_never_checked_eagerly_on_read() {
        // Sweep far in the future: even a long-idle entry stays readable
        // until the sweeper actually runs.
        let cache: Collection<String, u32> = Collection::new(CollectionOptions {
            expire: Some(Duration::from_millis(20)),
            sweep_interval: Duration::from_secs(3600),
            ..CollectionOptions::default()
        });
        cache.set("idle".into(), 7);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get(&"idle".into()), Some(7));
    }

    #[tokio::test]
    async fn traversal_helpers_use_value_key_order() {
        let cache = unbounded();
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        cache.set("c".into(), 3);
        assert_eq!(cache.filter(|v, _| *v > 1), vec![2, 3]);
        assert_eq!(cache.find(|_, k| k == "b"), Some(2));
        assert_eq!(cache.map(|v, _| v * 10), vec![10, 20, 30]);
        assert_eq!(cache.reduce(0, |acc, v| acc + v), 6);
        assert!(cache.some(|v, _| *v == 3));
        assert!(!cache.some(|v, _| *v == 9));
    }

    #[tokio::test]
    async fn clones_share_one_store() {
        let cache = unbounded();
        let alias = cache.clone();
        cache.set("a".into(), 1);
        assert_eq!(alias.get(&"a".into()), Some(1));
        let copy = cache.deep_clone();
        copy.set("b".into(), 2);
        assert!(!cache.has(&"b".into()));
    }
}
