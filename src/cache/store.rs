//! Namespaced cache storage with family-wide invalidation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::entry::{self, CacheEntry};
use super::families::Family;
use super::freshness::{classify, Freshness};
use crate::store::KvStore;

/// Namespaced cache over a durable key-value store.
///
/// Entries live under `<namespace>_<family>_<variant>` keys, so one
/// [`clear_family`](CacheStore::clear_family) call can drop every cached view
/// of a resource without knowing which variants were ever written.
///
/// One instance is constructed per app and shared behind an [`Arc`]; there is
/// deliberately no module-level singleton, so tests run against private
/// stores.
pub struct CacheStore {
  store: Arc<dyn KvStore>,
  namespace: String,
  /// Per-family TTL overrides from config; the declared table is the default.
  ttl_overrides: Vec<(Family, chrono::Duration)>,
  /// Full cache keys with a background refetch currently in flight.
  inflight: Mutex<HashSet<String>>,
}

impl CacheStore {
  pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> Self {
    Self {
      store,
      namespace: namespace.into(),
      ttl_overrides: Vec::new(),
      inflight: Mutex::new(HashSet::new()),
    }
  }

  /// Override the declared TTL for specific families.
  pub fn with_ttl_overrides(mut self, overrides: Vec<(Family, chrono::Duration)>) -> Self {
    self.ttl_overrides = overrides;
    self
  }

  fn key(&self, family: Family, variant: &str) -> String {
    format!("{}_{}_{}", self.namespace, family.as_str(), variant)
  }

  fn family_prefix(&self, family: Family) -> String {
    format!("{}_{}_", self.namespace, family.as_str())
  }

  fn ttl(&self, family: Family) -> chrono::Duration {
    self
      .ttl_overrides
      .iter()
      .find(|(f, _)| *f == family)
      .map(|(_, ttl)| *ttl)
      .unwrap_or_else(|| family.spec().ttl())
  }

  /// Read a variant along with its freshness classification.
  ///
  /// Entries past the family's max-age read as `None`: the hard cutoff makes
  /// them indistinguishable from never-cached data.
  pub fn get<T: DeserializeOwned>(
    &self,
    family: Family,
    variant: &str,
  ) -> Option<(CacheEntry<T>, Freshness)> {
    let entry: CacheEntry<T> = entry::read_entry(self.store.as_ref(), &self.key(family, variant))?;
    let spec = family.spec();
    let freshness = classify(
      Some(entry.timestamp),
      self.ttl(family),
      spec.max_age(),
      Utc::now(),
    );

    if freshness == Freshness::Absent {
      return None;
    }
    Some((entry, freshness))
  }

  /// Read a variant ignoring freshness entirely. Offline fallback only.
  pub(crate) fn get_any<T: DeserializeOwned>(
    &self,
    family: Family,
    variant: &str,
  ) -> Option<CacheEntry<T>> {
    entry::read_entry(self.store.as_ref(), &self.key(family, variant))
  }

  /// Write a variant, fully replacing any previous entry.
  pub fn put<T: Serialize>(&self, family: Family, variant: &str, data: &T) {
    entry::write_entry(self.store.as_ref(), &self.key(family, variant), data);
  }

  /// Write a variant with an explicit timestamp. Test hook for aging entries.
  #[cfg(test)]
  pub(crate) fn put_at<T: Serialize>(
    &self,
    family: Family,
    variant: &str,
    data: &T,
    timestamp: DateTime<Utc>,
  ) {
    entry::write_entry_at(self.store.as_ref(), &self.key(family, variant), data, timestamp);
  }

  /// Delete every stored variant of `family`.
  pub fn clear_family(&self, family: Family) {
    let prefix = self.family_prefix(family);
    let keys = match self.store.keys_with_prefix(&prefix) {
      Ok(keys) => keys,
      Err(e) => {
        warn!(family = family.as_str(), error = %e, "family scan failed, nothing cleared");
        return;
      }
    };

    for key in &keys {
      if let Err(e) = self.store.delete(key) {
        warn!(key, error = %e, "failed to delete cache entry");
      }
    }

    debug!(family = family.as_str(), cleared = keys.len(), "cache family cleared");
  }

  /// Invalidate `family` and, transitively, every family declared as a
  /// dependent of something cleared. Each family is cleared at most once per
  /// call, so dependency cycles cannot loop.
  ///
  /// Called synchronously after any confirmed mutation, including
  /// offline-queued mutations confirmed later by the sync coordinator.
  pub fn invalidate(&self, family: Family) {
    let mut visited: HashSet<Family> = HashSet::new();
    let mut stack = vec![family];

    while let Some(next) = stack.pop() {
      if !visited.insert(next) {
        continue;
      }
      self.clear_family(next);
      stack.extend(next.spec().dependents.iter().copied());
    }

    info!(
      family = family.as_str(),
      families = visited.len(),
      "cache invalidated"
    );
  }

  /// Claim the background-refetch slot for a key.
  ///
  /// Returns `false` when a refetch for the same key is already in flight, in
  /// which case the caller must not issue another network call.
  pub(crate) fn begin_refetch(&self, family: Family, variant: &str) -> bool {
    match self.inflight.lock() {
      Ok(mut inflight) => inflight.insert(self.key(family, variant)),
      Err(_) => false,
    }
  }

  pub(crate) fn finish_refetch(&self, family: Family, variant: &str) {
    if let Ok(mut inflight) = self.inflight.lock() {
      inflight.remove(&self.key(family, variant));
    }
  }

  /// Write through the result of a background refetch that observed an entry
  /// written at `observed`.
  ///
  /// Last-write-wins is by completion time: if a newer write landed while the
  /// refetch was in flight, or the entry was invalidated outright, the stale
  /// result is dropped instead of clobbering it.
  pub(crate) fn complete_refetch<T: Serialize>(
    &self,
    family: Family,
    variant: &str,
    observed: DateTime<Utc>,
    data: &T,
  ) {
    let key = self.key(family, variant);

    match entry::read_entry::<serde_json::Value>(self.store.as_ref(), &key) {
      Some(current) if current.timestamp > observed => {
        debug!(key, "dropping refetch result, newer write present");
      }
      None => {
        // Invalidated while the refetch was in flight. The response may
        // predate the mutation that cleared it, so it cannot be trusted.
        debug!(key, "dropping refetch result, entry was invalidated");
      }
      Some(_) => {
        entry::write_entry(self.store.as_ref(), &key, data);
        debug!(key, "background refresh written through");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use chrono::Duration;

  fn cache() -> CacheStore {
    CacheStore::new(Arc::new(MemoryStore::new()), "test")
  }

  #[test]
  fn test_put_get_fresh() {
    let cache = cache();
    cache.put(Family::Challenges, "mine", &vec!["plank-week"]);

    let (entry, freshness) = cache
      .get::<Vec<String>>(Family::Challenges, "mine")
      .unwrap();
    assert_eq!(entry.data, vec!["plank-week"]);
    assert_eq!(freshness, Freshness::Fresh);
  }

  #[test]
  fn test_aged_entry_reads_stale_then_absent() {
    let cache = cache();
    let spec = Family::Challenges.spec();

    let past_ttl = Utc::now() - spec.ttl() - Duration::seconds(60);
    cache.put_at(Family::Challenges, "mine", &1u32, past_ttl);
    let (_, freshness) = cache.get::<u32>(Family::Challenges, "mine").unwrap();
    assert_eq!(freshness, Freshness::Stale);

    let past_max_age = Utc::now() - spec.max_age() - Duration::seconds(60);
    cache.put_at(Family::Challenges, "mine", &1u32, past_max_age);
    assert!(cache.get::<u32>(Family::Challenges, "mine").is_none());
    // The raw entry is still there for offline fallback
    assert!(cache.get_any::<u32>(Family::Challenges, "mine").is_some());
  }

  #[test]
  fn test_ttl_override_wins_over_table() {
    let cache = CacheStore::new(Arc::new(MemoryStore::new()), "test")
      .with_ttl_overrides(vec![(Family::Challenges, Duration::seconds(1))]);

    cache.put_at(
      Family::Challenges,
      "mine",
      &1u32,
      Utc::now() - Duration::seconds(30),
    );
    let (_, freshness) = cache.get::<u32>(Family::Challenges, "mine").unwrap();
    assert_eq!(freshness, Freshness::Stale);
  }

  #[test]
  fn test_clear_family_drops_every_variant() {
    let cache = cache();
    cache.put(Family::Challenges, "mine", &1u32);
    cache.put(Family::Challenges, "public", &2u32);
    cache.put(Family::ChartData, "personal_weekly", &3u32);

    cache.clear_family(Family::Challenges);

    assert!(cache.get::<u32>(Family::Challenges, "mine").is_none());
    assert!(cache.get::<u32>(Family::Challenges, "public").is_none());
    assert!(cache.get::<u32>(Family::ChartData, "personal_weekly").is_some());
  }

  #[test]
  fn test_invalidate_fans_out_to_dependents() {
    let cache = cache();
    cache.put(Family::Workouts, "recent", &1u32);
    cache.put(Family::ProfileStats, "me", &2u32);
    cache.put(Family::ChartData, "personal_weekly", &3u32);
    cache.put(Family::Leaderboard, "global", &4u32);
    cache.put(Family::Challenges, "mine", &5u32);

    cache.invalidate(Family::Workouts);

    assert!(cache.get::<u32>(Family::Workouts, "recent").is_none());
    assert!(cache.get::<u32>(Family::ProfileStats, "me").is_none());
    assert!(cache.get::<u32>(Family::ChartData, "personal_weekly").is_none());
    assert!(cache.get::<u32>(Family::Leaderboard, "global").is_none());
    // Not a declared dependent of workouts
    assert!(cache.get::<u32>(Family::Challenges, "mine").is_some());
  }

  #[test]
  fn test_refetch_slot_is_exclusive() {
    let cache = cache();
    assert!(cache.begin_refetch(Family::Challenges, "mine"));
    assert!(!cache.begin_refetch(Family::Challenges, "mine"));
    // A different variant is its own slot
    assert!(cache.begin_refetch(Family::Challenges, "public"));

    cache.finish_refetch(Family::Challenges, "mine");
    assert!(cache.begin_refetch(Family::Challenges, "mine"));
  }

  #[test]
  fn test_slow_refetch_does_not_clobber_newer_write() {
    let cache = cache();
    let observed = Utc::now() - Duration::seconds(400);
    cache.put_at(Family::Challenges, "mine", &"old", observed);

    // A mutation writes newer data while the refetch is in flight
    cache.put(Family::Challenges, "mine", &"newer");
    cache.complete_refetch(Family::Challenges, "mine", observed, &"from-refetch");

    let (entry, _) = cache.get::<String>(Family::Challenges, "mine").unwrap();
    assert_eq!(entry.data, "newer");
  }

  #[test]
  fn test_refetch_result_dropped_after_invalidation() {
    let cache = cache();
    let observed = Utc::now() - Duration::seconds(400);
    cache.put_at(Family::Challenges, "mine", &"old", observed);

    cache.invalidate(Family::Challenges);
    cache.complete_refetch(Family::Challenges, "mine", observed, &"from-refetch");

    assert!(cache.get::<String>(Family::Challenges, "mine").is_none());
  }

  #[test]
  fn test_refetch_writes_through_when_unchanged() {
    let cache = cache();
    let observed = Utc::now() - Duration::seconds(400);
    cache.put_at(Family::Challenges, "mine", &"old", observed);

    cache.complete_refetch(Family::Challenges, "mine", observed, &"refreshed");

    let (entry, freshness) = cache.get::<String>(Family::Challenges, "mine").unwrap();
    assert_eq!(entry.data, "refreshed");
    assert_eq!(freshness, Freshness::Fresh);
  }
}
