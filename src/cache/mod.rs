//! Caching layer: stale-while-revalidate reads over durable storage.
//!
//! This module provides the cache half of the offline story:
//! - Entries are `{ data, timestamp }` envelopes in the key-value store
//! - A per-family freshness policy classifies reads as fresh, stale or absent
//! - Stale reads serve instantly and refresh in the background, deduplicated
//! - Mutations invalidate whole families, transitively through a declared
//!   dependency table

mod entry;
mod families;
mod freshness;
mod layer;
mod store;

pub use entry::CacheEntry;
pub use families::{CacheKey, Family, FamilySpec};
pub use freshness::Freshness;
pub use layer::{CacheLayer, CacheRead, CacheSource};
pub use store::CacheStore;
