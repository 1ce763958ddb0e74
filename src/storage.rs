//! Generic keyed storage and the process-wide callback store.
//!
//! Callbacks are held in a side table keyed by event identity instead of
//! inside the event record itself, so inspecting or serializing an event
//! never recurses into a closure's captured environment.

use std::hash::Hash;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::util::Callback;

/// Generic keyed storage backed by a concurrent map.
///
/// Pure point lookup: no ordering or iteration contract.
///
/// # Examples
///
/// ```
/// use tinderbox::storage::Storage;
///
/// let storage: Storage<&str, u32> = Storage::new();
/// storage.store("answer", 42);
///
/// assert_eq!(storage.item(&"answer"), Some(42));
/// assert_eq!(storage.unstore(&"answer"), Some(42));
/// assert!(storage.is_empty());
/// ```
pub struct Storage<K, V> {
    items: DashMap<K, V>,
}

impl<K: Eq + Hash, V: Clone> Storage<K, V> {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Store a value under a key, replacing any previous value.
    pub fn store(&self, key: K, value: V) {
        self.items.insert(key, value);
    }

    /// Fetch a clone of the value stored under a key.
    pub fn item(&self, key: &K) -> Option<V> {
        self.items.get(key).map(|entry| entry.value().clone())
    }

    /// Drop the value stored under a key, returning it if present.
    pub fn unstore(&self, key: &K) -> Option<V> {
        self.items.remove(key).map(|(_, value)| value)
    }

    /// Whether a value is stored under a key.
    pub fn contains(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> Default for Storage<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide map from event identity to stored callback.
static CALLBACKS: Lazy<Storage<Uuid, Callback>> = Lazy::new(Storage::new);

/// Side table keeping event callbacks out of the event records.
///
/// An entry is created when an event is constructed and destroyed on
/// once-fire, explicit removal, or when the last handle to the event drops.
pub(crate) struct CallbackStore;

impl CallbackStore {
    pub(crate) fn add(event_id: Uuid, callback: Callback) {
        CALLBACKS.store(event_id, callback);
    }

    pub(crate) fn get(event_id: &Uuid) -> Option<Callback> {
        CALLBACKS.item(event_id)
    }

    pub(crate) fn remove(event_id: &Uuid) {
        CALLBACKS.unstore(event_id);
    }

    pub(crate) fn contains(event_id: &Uuid) -> bool {
        CALLBACKS.contains(event_id)
    }
}
