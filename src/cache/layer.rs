//! Cache layer that orchestrates stale-while-revalidate reads.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::families::{CacheKey, Family};
use super::freshness::Freshness;
use super::store::CacheStore;

/// Where the data of a [`CacheRead`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the network just now (blocking fetch on a cache miss).
  Network,
  /// Cached and within TTL; no network call was made.
  Fresh,
  /// Cached and past TTL; a background refresh is running or already was.
  /// Show the data, mark the view as updating.
  Stale,
  /// Network unreachable; serving whatever the cache still holds.
  Offline,
}

/// Result of a cached read: the data plus where it came from.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
  pub data: T,
  pub source: CacheSource,
}

impl<T> CacheRead<T> {
  /// Whether the caller should show an "updating"/"offline" hint.
  pub fn is_stale(&self) -> bool {
    matches!(self.source, CacheSource::Stale | CacheSource::Offline)
  }
}

/// Read-through cache layer.
///
/// This layer sits between the typed client and the network, deciding per
/// read whether to serve from cache, refresh in the background, or block on a
/// fetch:
///
/// 1. Fresh entry: return it, zero network calls.
/// 2. Stale entry: return it immediately and spawn one background refetch for
///    the key; concurrent stale reads of the same key share that one refetch.
/// 3. No entry (or past max-age): fetch and block. If the fetch fails but an
///    expired entry survives, serve it as offline fallback.
pub struct CacheLayer {
  cache: Arc<CacheStore>,
}

impl CacheLayer {
  pub fn new(cache: Arc<CacheStore>) -> Self {
    Self { cache }
  }

  /// The underlying cache store, for invalidation after mutations.
  pub fn cache(&self) -> &Arc<CacheStore> {
    &self.cache
  }

  /// Fetch a view with the stale-while-revalidate strategy.
  ///
  /// The fetcher is consumed at most once: either awaited inline on a miss or
  /// moved into the background refresh task on a stale hit.
  pub async fn read_through<T, K, F, Fut>(&self, key: &K, fetcher: F) -> Result<CacheRead<T>>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    K: CacheKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let family = key.family();
    let variant = key.variant();

    match self.cache.get::<T>(family, &variant) {
      Some((entry, Freshness::Fresh)) => {
        debug!(key = %key.description(), "cache fresh");
        Ok(CacheRead {
          data: entry.data,
          source: CacheSource::Fresh,
        })
      }
      Some((entry, _)) => {
        // Stale: serve what we have, refresh behind the caller's back.
        self.spawn_refetch(family, &variant, key.description(), entry.timestamp, fetcher);
        Ok(CacheRead {
          data: entry.data,
          source: CacheSource::Stale,
        })
      }
      None => {
        debug!(key = %key.description(), "cache miss, fetching");
        match fetcher().await {
          Ok(data) => {
            self.cache.put(family, &variant, &data);
            Ok(CacheRead {
              data,
              source: CacheSource::Network,
            })
          }
          Err(e) => {
            // Transport failure: fall back to any surviving entry, even one
            // past its max-age, rather than showing the user nothing.
            if let Some(entry) = self.cache.get_any::<T>(family, &variant) {
              warn!(key = %key.description(), error = %e, "fetch failed, serving expired cache");
              return Ok(CacheRead {
                data: entry.data,
                source: CacheSource::Offline,
              });
            }
            Err(e)
          }
        }
      }
    }
  }

  /// Spawn the background refresh for a stale key, unless one is already in
  /// flight for it.
  fn spawn_refetch<T, F, Fut>(
    &self,
    family: Family,
    variant: &str,
    description: String,
    observed: DateTime<Utc>,
    fetcher: F,
  ) where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    if !self.cache.begin_refetch(family, variant) {
      debug!(key = %description, "refresh already in flight, serving stale");
      return;
    }

    debug!(key = %description, "cache stale, refreshing in background");
    let cache = Arc::clone(&self.cache);
    let variant = variant.to_string();
    let future = fetcher();

    tokio::spawn(async move {
      match future.await {
        Ok(data) => cache.complete_refetch(family, &variant, observed, &data),
        Err(e) => {
          // Next stale read will try again; the cached value stays served.
          warn!(key = %description, error = %e, "background refresh failed")
        }
      }
      cache.finish_refetch(family, &variant);
    });
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      cache: Arc::clone(&self.cache),
    }
  }
}
