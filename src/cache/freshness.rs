//! Fresh/stale/absent classification for cached entries.

use chrono::{DateTime, Duration, Utc};

/// How usable a cache entry is right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
  /// No entry, or the entry is past its hard max-age cutoff. The caller must
  /// fetch and block on the result.
  Absent,
  /// Within TTL. Serve the cached data; no network work at all.
  Fresh,
  /// Past TTL but within max-age. Serve the cached data immediately and
  /// schedule exactly one background refetch for the key.
  Stale,
}

/// Classify an entry written at `written_at` against a per-family policy.
///
/// `max_age` must be >= `ttl`; ages exactly at a boundary stay on the more
/// usable side (age == ttl is still fresh, age == max_age is still stale).
pub fn classify(
  written_at: Option<DateTime<Utc>>,
  ttl: Duration,
  max_age: Duration,
  now: DateTime<Utc>,
) -> Freshness {
  let Some(written_at) = written_at else {
    return Freshness::Absent;
  };

  let age = now - written_at;
  if age > max_age {
    Freshness::Absent
  } else if age > ttl {
    Freshness::Stale
  } else {
    Freshness::Fresh
  }
}
