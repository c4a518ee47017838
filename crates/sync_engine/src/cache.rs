//! Local snapshot cache.
//!
//! Two facilities over one persistence layer:
//!
//! 1. Entity snapshots: whole-collection overwrites of the last
//!    known-good tasks, notifications, and preferences, read back
//!    verbatim while offline.
//! 2. A generic response cache keyed by a hash of the request identity,
//!    with per-entry TTL, lazy expiry on read, and size-pressure
//!    eviction of the oldest quarter of entries.
//!
//! Both facilities never throw: persistence failures degrade to a miss,
//! because losing the cache must never break the primary data path.

use crate::storage::{self, keys, KeyValueStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use task_model::{Notification, Preferences, Task};

/// Default entry TTL: 5 minutes.
pub const DEFAULT_TTL_MS: u64 = 5 * 60 * 1_000;

/// Default ceiling on the serialized response cache: 10 MB.
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// The entity collections snapshotted for offline reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotKind {
    Tasks,
    Notifications,
    Preferences,
}

impl SnapshotKind {
    /// Storage key for this snapshot.
    pub fn key(self) -> &'static str {
        match self {
            SnapshotKind::Tasks => keys::TASKS,
            SnapshotKind::Notifications => keys::NOTIFICATIONS,
            SnapshotKind::Preferences => keys::PREFERENCES,
        }
    }
}

/// Whole-collection snapshots of the last known-good server state.
pub struct SnapshotCache {
    store: Box<dyn KeyValueStore>,
}

impl SnapshotCache {
    /// Create a snapshot cache over the given store.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Overwrite a snapshot. Returns `false` on persistence failure.
    pub fn save<T: Serialize>(&mut self, kind: SnapshotKind, data: &T) -> bool {
        storage::save_enveloped(self.store.as_mut(), kind.key(), data)
    }

    /// Read a snapshot back; `None` on miss or unreadable data.
    pub fn load<T: DeserializeOwned>(&self, kind: SnapshotKind) -> Option<T> {
        storage::load_enveloped(self.store.as_ref(), kind.key())
    }

    /// Overwrite the task snapshot.
    pub fn save_tasks(&mut self, tasks: &[Task]) -> bool {
        self.save(SnapshotKind::Tasks, &tasks)
    }

    /// Read the task snapshot.
    pub fn load_tasks(&self) -> Option<Vec<Task>> {
        self.load(SnapshotKind::Tasks)
    }

    /// Overwrite the notification snapshot.
    pub fn save_notifications(&mut self, notifications: &[Notification]) -> bool {
        self.save(SnapshotKind::Notifications, &notifications)
    }

    /// Read the notification snapshot.
    pub fn load_notifications(&self) -> Option<Vec<Notification>> {
        self.load(SnapshotKind::Notifications)
    }

    /// Overwrite the preferences snapshot.
    pub fn save_preferences(&mut self, preferences: &Preferences) -> bool {
        self.save(SnapshotKind::Preferences, preferences)
    }

    /// Read the preferences snapshot.
    pub fn load_preferences(&self) -> Option<Preferences> {
        self.load(SnapshotKind::Preferences)
    }
}

/// One entry in the response cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hashed request identity.
    pub key: String,
    /// The cached response body.
    pub payload: serde_json::Value,
    /// Write timestamp (ms since epoch).
    pub timestamp: u64,
    /// Time-to-live for this entry.
    pub ttl_ms: u64,
}

impl CacheEntry {
    /// Whether the entry is past its TTL at the given instant.
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.timestamp) >= self.ttl_ms
    }
}

/// TTL-based response cache with size-bounded eviction.
pub struct ResponseCache {
    store: Box<dyn KeyValueStore>,
    entries: HashMap<String, CacheEntry>,
    default_ttl_ms: u64,
    max_bytes: usize,
}

impl ResponseCache {
    /// Create a cache with default limits, reloading persisted entries.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self::with_limits(store, DEFAULT_TTL_MS, DEFAULT_MAX_BYTES)
    }

    /// Create a cache with an explicit TTL and size ceiling.
    pub fn with_limits(store: Box<dyn KeyValueStore>, default_ttl_ms: u64, max_bytes: usize) -> Self {
        let entries =
            storage::load_enveloped::<HashMap<String, CacheEntry>>(store.as_ref(), keys::RESPONSE_CACHE)
                .unwrap_or_default();
        Self {
            store,
            entries,
            default_ttl_ms,
            max_bytes,
        }
    }

    /// Build a cache key from a request's identity.
    pub fn cache_key(method: &str, path: &str, params: &str) -> String {
        let mut hasher = DefaultHasher::new();
        method.hash(&mut hasher);
        path.hash(&mut hasher);
        params.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Number of live entries (expired entries still count until read).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache a response under the default TTL.
    pub fn save(&mut self, key: &str, payload: serde_json::Value) -> bool {
        self.save_with_ttl(key, payload, self.default_ttl_ms)
    }

    /// Cache a response with an explicit TTL.
    ///
    /// If admitting the entry would push the serialized cache past its
    /// ceiling, the oldest 25% of entries are evicted first. Returns
    /// `false` on persistence failure; the entry still serves reads for
    /// the rest of the session.
    pub fn save_with_ttl(&mut self, key: &str, payload: serde_json::Value, ttl_ms: u64) -> bool {
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            timestamp: storage::current_timestamp_ms(),
            ttl_ms,
        };

        let projected = self.serialized_size() + Self::entry_size(&entry);
        if projected > self.max_bytes {
            self.evict_oldest_quarter();
        }

        self.entries.insert(key.to_string(), entry);
        self.persist()
    }

    /// Read a cached response. Entries past their TTL are treated as
    /// absent and removed lazily.
    pub fn load(&mut self, key: &str) -> Option<serde_json::Value> {
        self.load_at(key, storage::current_timestamp_ms())
    }

    fn load_at(&mut self, key: &str, now: u64) -> Option<serde_json::Value> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove(key);
                self.persist();
                None
            }
            Some(entry) => Some(entry.payload.clone()),
            None => None,
        }
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    fn entry_size(entry: &CacheEntry) -> usize {
        serde_json::to_string(entry).map(|s| s.len()).unwrap_or(0)
    }

    fn serialized_size(&self) -> usize {
        serde_json::to_string(&self.entries)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    fn evict_oldest_quarter(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let mut by_age: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.timestamp))
            .collect();
        by_age.sort_by_key(|(_, timestamp)| *timestamp);

        let evict = (by_age.len() / 4).max(1);
        for (key, _) in by_age.into_iter().take(evict) {
            self.entries.remove(&key);
        }
        tracing::debug!(evicted = evict, "response cache over its size ceiling");
    }

    fn persist(&mut self) -> bool {
        storage::save_enveloped(self.store.as_mut(), keys::RESPONSE_CACHE, &self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    // ========== Snapshot Tests ==========

    #[test]
    fn test_task_snapshot_round_trip() {
        let mut cache = SnapshotCache::new(Box::new(MemoryStore::new()));
        let tasks = vec![Task::new("1", "a"), Task::new("2", "b")];

        assert!(cache.save_tasks(&tasks));
        assert_eq!(cache.load_tasks().unwrap(), tasks);
    }

    #[test]
    fn test_snapshot_overwrites() {
        let mut cache = SnapshotCache::new(Box::new(MemoryStore::new()));
        cache.save_tasks(&[Task::new("1", "old")]);
        cache.save_tasks(&[Task::new("2", "new")]);

        let tasks = cache.load_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "2");
    }

    #[test]
    fn test_snapshot_miss_is_none() {
        let cache = SnapshotCache::new(Box::new(MemoryStore::new()));
        assert!(cache.load_tasks().is_none());
        assert!(cache.load_notifications().is_none());
        assert!(cache.load_preferences().is_none());
    }

    #[test]
    fn test_preferences_snapshot() {
        let mut cache = SnapshotCache::new(Box::new(MemoryStore::new()));
        let prefs = Preferences {
            theme: "dark".to_string(),
            ..Preferences::default()
        };

        assert!(cache.save_preferences(&prefs));
        assert_eq!(cache.load_preferences().unwrap(), prefs);
    }

    // ========== Response Cache Tests ==========

    #[test]
    fn test_response_cache_round_trip() {
        let mut cache = ResponseCache::new(Box::new(MemoryStore::new()));
        let key = ResponseCache::cache_key("GET", "/tasks", "page=1");

        assert!(cache.save(&key, json!({"tasks": []})));
        assert_eq!(cache.load(&key).unwrap(), json!({"tasks": []}));
    }

    #[test]
    fn test_cache_key_is_stable_and_distinct() {
        let a = ResponseCache::cache_key("GET", "/tasks", "page=1");
        let b = ResponseCache::cache_key("GET", "/tasks", "page=1");
        let c = ResponseCache::cache_key("GET", "/tasks", "page=2");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ttl_expiry_is_lazy() {
        let mut cache = ResponseCache::new(Box::new(MemoryStore::new()));
        cache.save_with_ttl("k", json!(1), 1_000);

        let written_at = cache.entries["k"].timestamp;

        // Just before expiry the entry is served
        assert!(cache.load_at("k", written_at + 999).is_some());

        // At TTL the entry is treated as absent and removed
        assert!(cache.load_at("k", written_at + 1_000).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_removed_from_store() {
        let mut cache = ResponseCache::new(Box::new(MemoryStore::new()));
        cache.save_with_ttl("k", json!(1), 1_000);
        let written_at = cache.entries["k"].timestamp;

        cache.load_at("k", written_at + 2_000);

        // Re-reading the persisted map shows the entry gone
        let persisted: HashMap<String, CacheEntry> =
            storage::load_enveloped(cache.store.as_ref(), keys::RESPONSE_CACHE).unwrap();
        assert!(persisted.is_empty());
    }

    #[test]
    fn test_size_pressure_evicts_oldest_quarter() {
        // Ceiling of one byte: every admission is over the limit
        let mut cache = ResponseCache::with_limits(Box::new(MemoryStore::new()), DEFAULT_TTL_MS, 1);

        // Seed entries directly with spread timestamps so age ordering
        // is deterministic
        for i in 0..8u64 {
            let key = format!("k{}", i);
            cache.entries.insert(
                key.clone(),
                CacheEntry {
                    key,
                    payload: json!(i),
                    timestamp: i,
                    ttl_ms: DEFAULT_TTL_MS,
                },
            );
        }

        cache.save("k8", json!("new"));

        // The oldest quarter (k0, k1) was evicted before admission
        assert!(cache.entries.get("k0").is_none());
        assert!(cache.entries.get("k1").is_none());
        assert!(cache.entries.get("k8").is_some());
        assert_eq!(cache.len(), 7);
    }

    #[test]
    fn test_saves_under_the_ceiling_do_not_evict() {
        let mut cache = ResponseCache::new(Box::new(MemoryStore::new()));
        for i in 0..8 {
            cache.save(&format!("k{}", i), json!(i));
        }
        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn test_cache_reloads_from_store() {
        let mut store = MemoryStore::new();
        {
            let mut cache = ResponseCache::new(Box::new(store.clone()));
            cache.save("k", json!({"cached": true}));
            store.set(
                keys::RESPONSE_CACHE,
                &cache.store.get(keys::RESPONSE_CACHE).unwrap(),
            );
        }

        let mut restored = ResponseCache::new(Box::new(store));
        assert_eq!(restored.load("k").unwrap(), json!({"cached": true}));
    }

    #[test]
    fn test_persistence_failure_degrades_to_session_cache() {
        struct FailingStore;
        impl KeyValueStore for FailingStore {
            fn get(&self, _key: &str) -> Option<String> {
                None
            }
            fn set(&mut self, _key: &str, _value: &str) -> bool {
                false
            }
            fn remove(&mut self, _key: &str) -> bool {
                false
            }
        }

        let mut cache = ResponseCache::new(Box::new(FailingStore));

        // The write is reported as failed but the entry still serves
        assert!(!cache.save("k", json!(1)));
        assert_eq!(cache.load("k").unwrap(), json!(1));
    }

    #[test]
    fn test_clear() {
        let mut cache = ResponseCache::new(Box::new(MemoryStore::new()));
        cache.save("k", json!(1));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.load("k").is_none());
    }
}
