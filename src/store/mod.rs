//! Durable key-value storage backends.
//!
//! Everything persistent in this crate (cache entries, the mutation queue)
//! goes through the [`KvStore`] trait: a synchronous, string-keyed store with
//! no policy of its own. [`SqliteStore`] is the production backend;
//! [`MemoryStore`] backs tests.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for synchronous, string-keyed durable storage.
///
/// Implementations report failures; the layers above decide what a failure
/// means (the cache codec treats any error as a miss).
pub trait KvStore: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Delete the value under `key`. Deleting a missing key is not an error.
  fn delete(&self, key: &str) -> Result<()>;

  /// List all keys starting with `prefix`, in no particular order.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// SQLite-based store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStore {
  /// Create a new SQLite store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Create a new SQLite store at the given path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Create a store backed by an in-memory database (not durable).
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("repsync").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

impl KvStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT value FROM kv WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare get: {}", e))?;

    let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).ok();
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store value: {}", e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete value: {}", e))?;

    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // GLOB, not LIKE: cache keys contain underscores, which LIKE treats as a
    // single-character wildcard.
    let pattern = format!("{}*", prefix);
    let mut stmt = conn
      .prepare("SELECT key FROM kv WHERE key GLOB ?")
      .map_err(|e| eyre!("Failed to prepare prefix scan: {}", e))?;

    let keys: Vec<String> = stmt
      .query_map(params![pattern], |row| row.get(0))
      .map_err(|e| eyre!("Failed to scan keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
  data: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KvStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let data = self
      .data
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(data.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut data = self
      .data
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    data.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let mut data = self
      .data
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    data.remove(key);
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let data = self
      .data
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      data
        .range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn roundtrip(store: &dyn KvStore) {
    assert_eq!(store.get("missing").unwrap(), None);

    store.set("a", "1").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

    store.set("a", "2").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

    store.delete("a").unwrap();
    assert_eq!(store.get("a").unwrap(), None);

    // Deleting a missing key is fine
    store.delete("a").unwrap();
  }

  #[test]
  fn test_memory_roundtrip() {
    roundtrip(&MemoryStore::new());
  }

  #[test]
  fn test_sqlite_roundtrip() {
    roundtrip(&SqliteStore::in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_persists_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let store = SqliteStore::open_at(&path).unwrap();
      store.set("repsync_challenges_mine", "[]").unwrap();
    }

    // Re-open and find the data still there
    let store = SqliteStore::open_at(&path).unwrap();
    assert_eq!(
      store.get("repsync_challenges_mine").unwrap().as_deref(),
      Some("[]")
    );
  }

  #[test]
  fn test_prefix_scan_treats_underscores_literally() {
    for store in [
      Box::new(MemoryStore::new()) as Box<dyn KvStore>,
      Box::new(SqliteStore::in_memory().unwrap()),
    ] {
      store.set("ns_challenges_mine", "a").unwrap();
      store.set("ns_challenges_public", "b").unwrap();
      store.set("ns_chart-data_personal_weekly", "c").unwrap();
      // Would match "ns_challenges_" under LIKE semantics ('_' wildcard)
      store.set("nsXchallengesXmine", "d").unwrap();

      let mut keys = store.keys_with_prefix("ns_challenges_").unwrap();
      keys.sort();
      assert_eq!(keys, vec!["ns_challenges_mine", "ns_challenges_public"]);
    }
  }
}
