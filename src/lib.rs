//! Client-side cache and offline mutation layer for the RepSync fitness
//! tracker.
//!
//! The UI reads views (challenges, workout history, charts, leaderboards)
//! through a stale-while-revalidate cache: anything cached shows instantly,
//! anything stale refreshes in the background, and only a true miss blocks.
//! Mutations invalidate whole cache families through a declared dependency
//! table, and workout logs submitted while offline land in a durable queue
//! that the sync coordinator replays in order once connectivity returns.
//!
//! Wiring it up:
//!
//! ```ignore
//! let config = Config::load(None)?;
//! let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open()?);
//! let cache = Arc::new(
//!   CacheStore::new(Arc::clone(&store), &config.namespace)
//!     .with_ttl_overrides(config.ttl_overrides()),
//! );
//! let queue = Arc::new(MutationQueue::new(Arc::clone(&store), &config.namespace));
//! let api = Arc::new(HttpApi::new(&config)?);
//!
//! let client = CachedClient::new(Arc::clone(&api), Arc::clone(&cache), Arc::clone(&queue));
//! let coordinator = SyncCoordinator::new(api, cache, queue)
//!   .with_replay_timeout(config.sync.replay_timeout());
//! // drive coordinator.run(config.sync.drain_interval(), online_rx) in a task
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod queue;
pub mod store;
pub mod sync;

pub use api::{ApiError, HttpApi, RemoteApi, SubmitReceipt};
pub use cache::{CacheKey, CacheLayer, CacheRead, CacheSource, CacheStore, Family, Freshness};
pub use client::{CachedClient, SubmitOutcome};
pub use config::Config;
pub use queue::{MutationKind, MutationQueue, QueuedMutation};
pub use store::{KvStore, MemoryStore, SqliteStore};
pub use sync::{DrainOutcome, SyncCoordinator, SyncNotification};
