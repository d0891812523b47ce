//! Cached client façade over the remote API.
//!
//! Wraps a [`RemoteApi`] with the same read surface the UI wants, but served
//! through the stale-while-revalidate cache, and routes mutations through the
//! invalidation bus and (for workout logs) the offline queue. Nothing here
//! throws across the public boundary: reads come back as
//! `have data / don't have data`, mutations as a [`SubmitOutcome`].

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::api::types::{
  Challenge, ChartPoint, LeaderboardRow, NewChallenge, ProfileStats, WorkoutEntry, WorkoutSummary,
};
use crate::api::views::{ChallengeView, ChartView, LeaderboardView, ProfileView, WorkoutView};
use crate::api::{ApiError, RemoteApi, SubmitReceipt};
use crate::cache::{CacheKey, CacheLayer, CacheRead, CacheStore};
use crate::queue::{MutationKind, MutationQueue, QueuedMutation};

/// Outcome of a mutation submitted through the façade.
#[derive(Debug)]
pub enum SubmitOutcome {
  /// Committed by the server; affected cache families were invalidated.
  Synced(SubmitReceipt),
  /// Network unreachable; the mutation is queued and will replay on
  /// reconnect. Treat as optimistic success with a "will sync" indicator.
  Queued { mutation_id: String },
  /// The server rejected the mutation. Not queued, not retried.
  Rejected(String),
  /// Credentials expired; refresh and resubmit.
  AuthExpired,
  /// The mutation could not be submitted or persisted locally.
  Failed(String),
}

/// Client with transparent caching and offline support.
pub struct CachedClient<A: RemoteApi> {
  api: Arc<A>,
  layer: CacheLayer,
  queue: Arc<MutationQueue>,
}

impl<A: RemoteApi> CachedClient<A> {
  pub fn new(api: Arc<A>, cache: Arc<CacheStore>, queue: Arc<MutationQueue>) -> Self {
    Self {
      api,
      layer: CacheLayer::new(cache),
      queue,
    }
  }

  /// The cache store shared with the sync coordinator.
  pub fn cache(&self) -> &Arc<CacheStore> {
    self.layer.cache()
  }

  /// Read one view through the cache, parsing the fetched JSON into `T`.
  async fn read<T, K>(&self, view: &K, path: String) -> Result<CacheRead<T>>
  where
    T: serde::Serialize + DeserializeOwned + Send + 'static,
    K: CacheKey,
  {
    let api = Arc::clone(&self.api);
    self
      .layer
      .read_through(view, move || async move {
        let value = api.fetch_json(&path).await?;
        serde_json::from_value(value).map_err(|e| eyre!("Failed to parse response: {}", e))
      })
      .await
  }

  /// Challenges for a listing view.
  pub async fn challenges(&self, view: &ChallengeView) -> Result<CacheRead<Vec<Challenge>>> {
    self.read(view, view.request_path()).await
  }

  /// A single challenge by id.
  pub async fn challenge(&self, id: &str) -> Result<CacheRead<Challenge>> {
    let view = ChallengeView::ById(id.to_string());
    self.read(&view, view.request_path()).await
  }

  /// Workout history.
  pub async fn workouts(&self, view: &WorkoutView) -> Result<CacheRead<Vec<WorkoutSummary>>> {
    self.read(view, view.request_path()).await
  }

  /// Chart series for the given view.
  pub async fn chart_data(&self, view: &ChartView) -> Result<CacheRead<Vec<ChartPoint>>> {
    self.read(view, view.request_path()).await
  }

  /// The user's aggregate statistics.
  pub async fn profile_stats(&self) -> Result<CacheRead<ProfileStats>> {
    self.read(&ProfileView, ProfileView.request_path()).await
  }

  /// Leaderboard standings.
  pub async fn leaderboard(&self, view: &LeaderboardView) -> Result<CacheRead<Vec<LeaderboardRow>>> {
    self.read(view, view.request_path()).await
  }

  /// Log a workout.
  ///
  /// On transport failure the entry is queued for replay and reported as
  /// optimistic success; a logged workout is never lost to a dead network.
  pub async fn log_workout(&self, entry: &WorkoutEntry) -> SubmitOutcome {
    let payload = match serde_json::to_value(entry) {
      Ok(payload) => payload,
      Err(e) => return SubmitOutcome::Failed(format!("unserializable workout entry: {}", e)),
    };

    // Built before the first submit so the idempotency id survives into the
    // queue if the network is down.
    let mutation = QueuedMutation::new(MutationKind::WorkoutLog, payload);
    match self.submit_now(mutation).await {
      Ok(outcome) => outcome,
      Err(mutation) => {
        let id = mutation.id.clone();
        match self.queue.push(mutation) {
          Ok(()) => SubmitOutcome::Queued { mutation_id: id },
          // Network down and storage dead: nowhere left to put it
          Err(e) => SubmitOutcome::Failed(format!("failed to queue workout: {}", e)),
        }
      }
    }
  }

  /// Create a challenge. Online-only: a transport failure is surfaced rather
  /// than queued, since challenge creation is interactive.
  pub async fn create_challenge(&self, req: &NewChallenge) -> SubmitOutcome {
    let payload = match serde_json::to_value(req) {
      Ok(payload) => payload,
      Err(e) => return SubmitOutcome::Failed(format!("unserializable challenge: {}", e)),
    };

    let mutation = QueuedMutation::new(MutationKind::ChallengeCreate, payload);
    match self.submit_now(mutation).await {
      Ok(outcome) => outcome,
      Err(_) => SubmitOutcome::Failed("network unreachable, try again".to_string()),
    }
  }

  /// Submit a mutation right now. `Err` hands the mutation back on transport
  /// failure so the caller decides whether it queues.
  async fn submit_now(&self, mutation: QueuedMutation) -> Result<SubmitOutcome, QueuedMutation> {
    match self.api.submit(&mutation).await {
      Ok(receipt) => {
        self.layer.cache().invalidate(mutation.kind.family());
        Ok(SubmitOutcome::Synced(receipt))
      }
      Err(ApiError::Rejected(message)) => Ok(SubmitOutcome::Rejected(message)),
      Err(ApiError::AuthExpired) => Ok(SubmitOutcome::AuthExpired),
      Err(ApiError::Transport(e)) => {
        warn!(kind = mutation.kind.as_str(), error = %e, "submit failed at transport level");
        Err(mutation)
      }
    }
  }

  /// Workout entries still waiting to sync, for "pending" badges and
  /// optimistic session counters.
  pub fn pending_workouts(&self) -> Vec<Value> {
    self
      .queue
      .pending()
      .into_iter()
      .filter(|m| m.kind == MutationKind::WorkoutLog)
      .map(|m| m.payload)
      .collect()
  }
}

impl<A: RemoteApi> Clone for CachedClient<A> {
  fn clone(&self) -> Self {
    Self {
      api: Arc::clone(&self.api),
      layer: self.layer.clone(),
      queue: Arc::clone(&self.queue),
    }
  }
}
