//! Local persistence abstraction shared by the queue and caches.
//!
//! Storage is a plain string key/value interface so it can sit on top of
//! whatever the host platform offers (browser local storage, a file, an
//! embedded database). The contract is deliberately never-throwing: a
//! failed write returns `false`, a failed read returns `None`, and the
//! caller degrades to "no cache / no durability for this write" instead
//! of propagating an error across component boundaries.
//!
//! All persisted values are wrapped in a `{data, timestamp, version}`
//! envelope to support future schema evolution.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current envelope schema version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Well-known storage keys.
pub mod keys {
    /// Snapshot of the canonical task collection.
    pub const TASKS: &str = "tasks";
    /// Snapshot of the notification collection.
    pub const NOTIFICATIONS: &str = "notifications";
    /// Snapshot of user preferences.
    pub const PREFERENCES: &str = "preferences";
    /// The durable action queue.
    pub const ACTION_QUEUE: &str = "action_queue";
    /// The generic TTL response cache.
    pub const RESPONSE_CACHE: &str = "response_cache";
    /// The shared display theme propagated across tabs.
    pub const THEME: &str = "theme";
}

/// String key/value storage with a never-throwing contract.
pub trait KeyValueStore {
    /// Read the value for a key, `None` on miss or read failure.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value. Returns `false` on persistence failure.
    fn set(&mut self, key: &str, value: &str) -> bool;

    /// Remove a key. Returns `false` if the key was absent or the
    /// removal failed.
    fn remove(&mut self, key: &str) -> bool;
}

/// Versioned wrapper around every persisted value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The wrapped payload.
    pub data: T,
    /// Write timestamp (ms since epoch).
    pub timestamp: u64,
    /// Envelope schema version.
    pub version: u32,
}

impl<T> Envelope<T> {
    /// Wrap a payload under the current schema version.
    pub fn new(data: T) -> Self {
        Self {
            data,
            timestamp: current_timestamp_ms(),
            version: ENVELOPE_VERSION,
        }
    }
}

/// Serialize `data` into an envelope and write it under `key`.
///
/// Returns `false` if serialization or the store write failed; the
/// failure is logged and absorbed.
pub fn save_enveloped<T: Serialize>(store: &mut dyn KeyValueStore, key: &str, data: &T) -> bool {
    let envelope = Envelope {
        data,
        timestamp: current_timestamp_ms(),
        version: ENVELOPE_VERSION,
    };
    match serde_json::to_string(&envelope) {
        Ok(json) => {
            let ok = store.set(key, &json);
            if !ok {
                tracing::warn!(key, "storage write failed, value not persisted");
            }
            ok
        }
        Err(err) => {
            tracing::warn!(key, %err, "failed to serialize value for storage");
            false
        }
    }
}

/// Read the envelope under `key` and return its payload.
///
/// Any failure (missing key, read failure, malformed or incompatible
/// envelope) degrades to `None`.
pub fn load_enveloped<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let json = store.get(key)?;
    match serde_json::from_str::<Envelope<T>>(&json) {
        Ok(envelope) => Some(envelope.data),
        Err(err) => {
            tracing::warn!(key, %err, "discarding unreadable stored value");
            None
        }
    }
}

/// In-memory store used in tests and as a default backend.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> bool {
        self.values.insert(key.to_string(), value.to_string());
        true
    }

    fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }
}

/// Get the current timestamp in milliseconds since epoch.
pub(crate) fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store whose writes always fail, for exercising the degradation path.
    #[derive(Default)]
    pub(crate) struct FailingStore;

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

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty());

        assert!(store.set("k", "v"));
        assert_eq!(store.get("k"), Some("v".to_string()));
        assert_eq!(store.len(), 1);

        assert!(store.remove("k"));
        assert_eq!(store.get("k"), None);
        assert!(!store.remove("k"));
    }

    #[test]
    fn test_enveloped_round_trip() {
        let mut store = MemoryStore::new();
        let data = vec!["a".to_string(), "b".to_string()];

        assert!(save_enveloped(&mut store, "list", &data));
        let restored: Vec<String> = load_enveloped(&store, "list").unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_envelope_carries_version_and_timestamp() {
        let mut store = MemoryStore::new();
        assert!(save_enveloped(&mut store, "n", &42u32));

        let raw = store.get("n").unwrap();
        let envelope: Envelope<u32> = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope.version, ENVELOPE_VERSION);
        assert!(envelope.timestamp > 0);
        assert_eq!(envelope.data, 42);
    }

    #[test]
    fn test_load_enveloped_missing_key() {
        let store = MemoryStore::new();
        let value: Option<u32> = load_enveloped(&store, "missing");
        assert!(value.is_none());
    }

    #[test]
    fn test_load_enveloped_malformed_value_degrades_to_none() {
        let mut store = MemoryStore::new();
        store.set("bad", "not json");

        let value: Option<u32> = load_enveloped(&store, "bad");
        assert!(value.is_none());
    }

    #[test]
    fn test_save_enveloped_failing_store_returns_false() {
        let mut store = FailingStore;
        assert!(!save_enveloped(&mut store, "k", &1u32));
    }
}
