//! Cache entry envelope and its fail-open codec.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::KvStore;

/// A cached payload wrapped with the time it was written.
///
/// Every write fully replaces the previous entry for its key; there is no
/// merging of payloads from different writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  /// Milliseconds since epoch at write time.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  /// Age of the entry relative to `now`.
  pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
    now - self.timestamp
  }
}

/// Serialize-only view so writing doesn't require owning the payload.
#[derive(Serialize)]
struct EntryRef<'a, T> {
  data: &'a T,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  timestamp: DateTime<Utc>,
}

/// Write `data` under `key`, stamped with the current time.
///
/// Serialization and storage failures are logged and swallowed: a value that
/// could not be cached is indistinguishable from one that was never cached.
pub fn write_entry<T: Serialize>(store: &dyn KvStore, key: &str, data: &T) {
  write_entry_at(store, key, data, Utc::now());
}

pub(crate) fn write_entry_at<T: Serialize>(
  store: &dyn KvStore,
  key: &str,
  data: &T,
  timestamp: DateTime<Utc>,
) {
  let entry = EntryRef { data, timestamp };
  let raw = match serde_json::to_string(&entry) {
    Ok(raw) => raw,
    Err(e) => {
      debug!(key, error = %e, "failed to serialize cache entry, skipping");
      return;
    }
  };

  if let Err(e) = store.set(key, &raw) {
    debug!(key, error = %e, "failed to persist cache entry, skipping");
  }
}

/// Read the entry under `key`.
///
/// Any storage or parse error is a cache miss, never an error the caller has
/// to handle.
pub fn read_entry<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<CacheEntry<T>> {
  let raw = match store.get(key) {
    Ok(Some(raw)) => raw,
    Ok(None) => return None,
    Err(e) => {
      debug!(key, error = %e, "cache read failed, treating as miss");
      return None;
    }
  };

  match serde_json::from_str(&raw) {
    Ok(entry) => Some(entry),
    Err(e) => {
      debug!(key, error = %e, "corrupt cache entry, treating as miss");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  #[test]
  fn test_write_read_roundtrip() {
    let store = MemoryStore::new();
    write_entry(&store, "k", &vec!["squat", "pushup"]);

    let entry: CacheEntry<Vec<String>> = read_entry(&store, "k").unwrap();
    assert_eq!(entry.data, vec!["squat", "pushup"]);
    assert!(entry.age(Utc::now()) >= chrono::Duration::zero());
  }

  #[test]
  fn test_missing_key_is_none() {
    let store = MemoryStore::new();
    assert!(read_entry::<u32>(&store, "nope").is_none());
  }

  #[test]
  fn test_corrupt_entry_is_a_miss() {
    let store = MemoryStore::new();
    store.set("k", "{not json").unwrap();
    assert!(read_entry::<u32>(&store, "k").is_none());

    // Valid JSON with the wrong shape is also a miss
    store.set("k", r#"{"other": 1}"#).unwrap();
    assert!(read_entry::<u32>(&store, "k").is_none());
  }

  #[test]
  fn test_envelope_uses_millisecond_timestamps() {
    let store = MemoryStore::new();
    let written = Utc::now();
    write_entry_at(&store, "k", &1u32, written);

    let raw = store.get("k").unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["data"], 1);
    assert_eq!(value["timestamp"], written.timestamp_millis());
  }

  #[test]
  fn test_write_replaces_prior_entry() {
    let store = MemoryStore::new();
    write_entry(&store, "k", &vec![1, 2, 3]);
    write_entry(&store, "k", &vec![9]);

    let entry: CacheEntry<Vec<u32>> = read_entry(&store, "k").unwrap();
    assert_eq!(entry.data, vec![9]);
  }
}
