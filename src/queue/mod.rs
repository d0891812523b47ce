//! Durable FIFO queue of mutations awaiting replay.
//!
//! When a mutation cannot reach the API, it lands here and survives reload.
//! Items leave the queue only when the server confirms them (or explicitly
//! rejects them); a transport failure never drops a logged workout.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::Family;
use crate::store::KvStore;

/// Kinds of mutations the API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
  /// A workout log entry. The only kind replayed from the offline queue.
  WorkoutLog,
  /// Challenge creation. Submitted online-only, never queued.
  ChallengeCreate,
}

impl MutationKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::WorkoutLog => "workout_log",
      Self::ChallengeCreate => "challenge_create",
    }
  }

  /// The cache family a confirmed mutation of this kind invalidates (its
  /// declared dependents follow transitively).
  pub fn family(&self) -> Family {
    match self {
      Self::WorkoutLog => Family::Workouts,
      Self::ChallengeCreate => Family::Challenges,
    }
  }
}

/// A mutation with everything needed to replay it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMutation {
  /// Client-generated id, stable across retries. The server deduplicates
  /// replays on it, so a replay whose original submit actually succeeded
  /// (response lost, not the request) cannot double-count.
  pub id: String,
  pub kind: MutationKind,
  /// The mutation body as submitted.
  pub payload: Value,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub enqueued_at: DateTime<Utc>,
  /// Failed replay count. Telemetry only; never used to drop an item.
  pub attempts: u32,
}

impl QueuedMutation {
  /// Build a mutation with a fresh idempotency id.
  ///
  /// Built before the first submit attempt, so the id the server saw on a
  /// lost-response failure is the same id any later replay carries.
  pub fn new(kind: MutationKind, payload: Value) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      kind,
      payload,
      enqueued_at: Utc::now(),
      attempts: 0,
    }
  }
}

/// Durable FIFO list of pending mutations.
///
/// The whole queue is persisted as one JSON array under a single well-known
/// key and rewritten on every change.
pub struct MutationQueue {
  store: Arc<dyn KvStore>,
  key: String,
}

impl MutationQueue {
  pub fn new(store: Arc<dyn KvStore>, namespace: &str) -> Self {
    Self {
      store,
      key: format!("{}_mutation_queue", namespace),
    }
  }

  /// Append a mutation and persist immediately.
  pub fn push(&self, mutation: QueuedMutation) -> Result<()> {
    let mut items = self.load();
    info!(
      id = %mutation.id,
      kind = mutation.kind.as_str(),
      pending = items.len() + 1,
      "mutation queued for sync"
    );
    items.push(mutation);
    self.save(&items)
  }

  /// Build and append a new mutation, returning it.
  pub fn enqueue(&self, kind: MutationKind, payload: Value) -> Result<QueuedMutation> {
    let mutation = QueuedMutation::new(kind, payload);
    self.push(mutation.clone())?;
    Ok(mutation)
  }

  /// All pending mutations in enqueue order.
  pub fn pending(&self) -> Vec<QueuedMutation> {
    self.load()
  }

  pub fn len(&self) -> usize {
    self.load().len()
  }

  pub fn is_empty(&self) -> bool {
    self.load().is_empty()
  }

  /// The next mutation to replay, if any.
  pub fn peek_next(&self) -> Option<QueuedMutation> {
    self.load().into_iter().next()
  }

  /// Remove the mutation with `id` after the server confirmed it.
  ///
  /// Dequeue is by id, never by position, so a confirmation racing with new
  /// enqueues cannot remove the wrong item. Returns whether anything was
  /// removed.
  pub fn confirm(&self, id: &str) -> Result<bool> {
    self.remove(id, "synced")
  }

  /// Drop a mutation the server rejected outright. Not a confirmation: the
  /// caller surfaces the rejection to the user instead.
  pub fn discard(&self, id: &str) -> Result<bool> {
    self.remove(id, "discarded after rejection")
  }

  /// Record a failed replay attempt against the item.
  pub fn record_attempt(&self, id: &str) -> Result<()> {
    let mut items = self.load();
    if let Some(item) = items.iter_mut().find(|m| m.id == id) {
      item.attempts += 1;
    }
    self.save(&items)
  }

  fn remove(&self, id: &str, why: &str) -> Result<bool> {
    let mut items = self.load();
    let before = items.len();
    items.retain(|m| m.id != id);

    if items.len() == before {
      warn!(id, "dequeue for unknown mutation id");
      return Ok(false);
    }

    self.save(&items)?;
    info!(id, pending = items.len(), "mutation {}", why);
    Ok(true)
  }

  fn load(&self) -> Vec<QueuedMutation> {
    match self.store.get(&self.key) {
      Ok(Some(raw)) => match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(e) => {
          warn!(error = %e, "corrupt mutation queue, treating as empty");
          Vec::new()
        }
      },
      Ok(None) => Vec::new(),
      Err(e) => {
        warn!(error = %e, "failed to read mutation queue");
        Vec::new()
      }
    }
  }

  fn save(&self, items: &[QueuedMutation]) -> Result<()> {
    let raw = serde_json::to_string(items)
      .map_err(|e| eyre!("Failed to serialize mutation queue: {}", e))?;
    self.store.set(&self.key, &raw)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use serde_json::json;

  fn queue_over(store: &Arc<MemoryStore>) -> MutationQueue {
    MutationQueue::new(Arc::clone(store) as Arc<dyn KvStore>, "test")
  }

  #[test]
  fn test_enqueue_assigns_id_and_persists() {
    let store = Arc::new(MemoryStore::new());
    let queue = queue_over(&store);

    let mutation = queue
      .enqueue(MutationKind::WorkoutLog, json!({"exercise": "pushup", "amount": 20}))
      .unwrap();

    assert!(!mutation.id.is_empty());
    assert_eq!(mutation.attempts, 0);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.peek_next().unwrap().id, mutation.id);
  }

  #[test]
  fn test_queue_survives_reload() {
    let store = Arc::new(MemoryStore::new());
    let first = queue_over(&store);
    let mutation = first
      .enqueue(MutationKind::WorkoutLog, json!({"amount": 10}))
      .unwrap();

    // Same backing store, fresh queue instance: what a reload looks like
    let second = queue_over(&store);
    let pending = second.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, mutation.id);
    assert_eq!(pending[0].payload, json!({"amount": 10}));
  }

  #[test]
  fn test_fifo_order_preserved() {
    let store = Arc::new(MemoryStore::new());
    let queue = queue_over(&store);

    let ids: Vec<String> = (0..5)
      .map(|i| {
        queue
          .enqueue(MutationKind::WorkoutLog, json!({ "n": i }))
          .unwrap()
          .id
      })
      .collect();

    let pending: Vec<String> = queue.pending().into_iter().map(|m| m.id).collect();
    assert_eq!(pending, ids);
  }

  #[test]
  fn test_confirm_removes_only_matching_id() {
    let store = Arc::new(MemoryStore::new());
    let queue = queue_over(&store);

    let a = queue.enqueue(MutationKind::WorkoutLog, json!({})).unwrap();
    let b = queue.enqueue(MutationKind::WorkoutLog, json!({})).unwrap();

    assert!(queue.confirm(&b.id).unwrap());
    let pending = queue.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, a.id);

    // Confirming an id that is not queued removes nothing
    assert!(!queue.confirm("no-such-id").unwrap());
    assert_eq!(queue.len(), 1);
  }

  #[test]
  fn test_record_attempt_increments_and_persists() {
    let store = Arc::new(MemoryStore::new());
    let queue = queue_over(&store);
    let mutation = queue.enqueue(MutationKind::WorkoutLog, json!({})).unwrap();

    queue.record_attempt(&mutation.id).unwrap();
    queue.record_attempt(&mutation.id).unwrap();

    assert_eq!(queue.peek_next().unwrap().attempts, 2);
    // Attempts never remove the item
    assert_eq!(queue.len(), 1);
  }

  #[test]
  fn test_corrupt_queue_reads_as_empty() {
    let store = Arc::new(MemoryStore::new());
    store.set("test_mutation_queue", "{broken").unwrap();

    let queue = queue_over(&store);
    assert!(queue.is_empty());

    // And recovers on the next write
    queue.enqueue(MutationKind::WorkoutLog, json!({})).unwrap();
    assert_eq!(queue.len(), 1);
  }
}
