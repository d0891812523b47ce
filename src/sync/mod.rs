//! Queue draining and reconcile notifications.
//!
//! The coordinator replays queued mutations strictly in enqueue order,
//! triggered by app load, a connectivity signal, or a periodic timer. Each
//! confirmed replay invalidates the affected cache families and broadcasts a
//! notification so UI components can reconcile optimistic local counters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::api::{ApiError, RemoteApi, SubmitReceipt};
use crate::cache::CacheStore;
use crate::queue::MutationQueue;

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
  /// Nothing was queued.
  Idle,
  /// Every queued mutation reached a terminal state.
  Complete,
  /// Some mutations synced before a transport failure stopped the pass.
  Partial,
  /// The first mutation could not be submitted; everything is still queued.
  Failed,
  /// Auth expired; the drain paused with items intact until credentials are
  /// refreshed.
  AuthExpired,
  /// Another drain was already running.
  AlreadyDraining,
}

/// Notification emitted when a queued mutation reaches a terminal state.
///
/// Consumed by UI components to reconcile optimistic state and show
/// confirmation (or rejection) feedback.
#[derive(Debug, Clone)]
pub struct SyncNotification {
  pub mutation_id: String,
  pub success: bool,
  /// Server confirmation; present iff `success`.
  pub receipt: Option<SubmitReceipt>,
  /// The replayed payload, so local totals can be adjusted.
  pub payload: Value,
  /// Rejection message; present iff not `success`.
  pub error: Option<String>,
}

/// Orchestrates offline-queue replay against the remote API.
pub struct SyncCoordinator<A: RemoteApi> {
  api: Arc<A>,
  cache: Arc<CacheStore>,
  queue: Arc<MutationQueue>,
  draining: AtomicBool,
  last_drain: Mutex<Option<DrainOutcome>>,
  /// Deadline per replay attempt; expiry counts as a transport failure and
  /// always releases the draining flag.
  replay_timeout: Duration,
  notify_tx: broadcast::Sender<SyncNotification>,
}

impl<A: RemoteApi> SyncCoordinator<A> {
  pub fn new(api: Arc<A>, cache: Arc<CacheStore>, queue: Arc<MutationQueue>) -> Self {
    let (notify_tx, _) = broadcast::channel(32);
    Self {
      api,
      cache,
      queue,
      draining: AtomicBool::new(false),
      last_drain: Mutex::new(None),
      replay_timeout: Duration::from_secs(30),
      notify_tx,
    }
  }

  /// Set the per-item replay deadline.
  pub fn with_replay_timeout(mut self, replay_timeout: Duration) -> Self {
    self.replay_timeout = replay_timeout;
    self
  }

  /// Subscribe to sync notifications.
  pub fn subscribe(&self) -> broadcast::Receiver<SyncNotification> {
    self.notify_tx.subscribe()
  }

  /// Whether a drain is currently running.
  pub fn is_draining(&self) -> bool {
    self.draining.load(Ordering::SeqCst)
  }

  /// Outcome of the most recent drain pass, if any ran yet.
  pub fn last_drain(&self) -> Option<DrainOutcome> {
    self.last_drain.lock().ok().and_then(|g| *g)
  }

  /// Replay every queued mutation in enqueue order.
  ///
  /// A transport failure stops the pass at the failing item so order is
  /// preserved; a later drain picks up from the same spot.
  pub async fn drain(&self) -> DrainOutcome {
    if self.draining.swap(true, Ordering::SeqCst) {
      debug!("drain already in progress, skipping");
      return DrainOutcome::AlreadyDraining;
    }

    let outcome = self.drain_inner().await;

    self.draining.store(false, Ordering::SeqCst);
    if let Ok(mut last) = self.last_drain.lock() {
      *last = Some(outcome);
    }
    outcome
  }

  async fn drain_inner(&self) -> DrainOutcome {
    let mut synced = 0usize;

    loop {
      let Some(mutation) = self.queue.peek_next() else {
        if synced == 0 {
          return DrainOutcome::Idle;
        }
        info!(synced, "mutation queue drained");
        return DrainOutcome::Complete;
      };

      debug!(
        id = %mutation.id,
        kind = mutation.kind.as_str(),
        attempts = mutation.attempts,
        "replaying mutation"
      );

      match timeout(self.replay_timeout, self.api.submit(&mutation)).await {
        Ok(Ok(receipt)) => {
          if let Err(e) = self.queue.confirm(&mutation.id) {
            warn!(id = %mutation.id, error = %e, "failed to dequeue confirmed mutation");
          }
          // Invalidate here too, not only on the immediate success path:
          // derived views went stale the moment the server committed.
          self.cache.invalidate(mutation.kind.family());
          let _ = self.notify_tx.send(SyncNotification {
            mutation_id: mutation.id.clone(),
            success: true,
            receipt: Some(receipt),
            payload: mutation.payload.clone(),
            error: None,
          });
          info!(id = %mutation.id, "mutation synced");
          synced += 1;
        }
        Ok(Err(ApiError::Rejected(message))) => {
          // Replaying a rejected mutation fails identically; drop it and
          // surface the rejection instead of wedging the queue behind it.
          warn!(id = %mutation.id, %message, "mutation rejected by server, discarding");
          if let Err(e) = self.queue.discard(&mutation.id) {
            warn!(id = %mutation.id, error = %e, "failed to discard rejected mutation");
          }
          let _ = self.notify_tx.send(SyncNotification {
            mutation_id: mutation.id.clone(),
            success: false,
            receipt: None,
            payload: mutation.payload.clone(),
            error: Some(message),
          });
        }
        Ok(Err(ApiError::AuthExpired)) => {
          info!(id = %mutation.id, synced, "auth expired, drain paused");
          return DrainOutcome::AuthExpired;
        }
        Ok(Err(ApiError::Transport(e))) => {
          let _ = self.queue.record_attempt(&mutation.id);
          warn!(id = %mutation.id, error = %e, synced, "transport failure, stopping drain");
          return if synced == 0 {
            DrainOutcome::Failed
          } else {
            DrainOutcome::Partial
          };
        }
        Err(_) => {
          let _ = self.queue.record_attempt(&mutation.id);
          warn!(id = %mutation.id, synced, "replay timed out, stopping drain");
          return if synced == 0 {
            DrainOutcome::Failed
          } else {
            DrainOutcome::Partial
          };
        }
      }
    }
  }

  /// Drive drains from load, reconnect and a periodic timer.
  ///
  /// `online` should flip to `true` whenever connectivity returns; the
  /// interval catches anything the signal misses. Returns when the sender
  /// side of `online` is dropped.
  pub async fn run(&self, interval: Duration, mut online: watch::Receiver<bool>) {
    // Drain whatever survived the last shutdown
    if *online.borrow() {
      self.drain().await;
    }

    let mut ticker = tokio::time::interval(interval);
    // The immediate first tick duplicates the load-time drain above
    ticker.tick().await;

    loop {
      tokio::select! {
        changed = online.changed() => {
          if changed.is_err() {
            break;
          }
          if *online.borrow() {
            info!("connectivity restored, draining mutation queue");
            self.drain().await;
          }
        }
        _ = ticker.tick() => {
          if *online.borrow() && !self.queue.is_empty() {
            self.drain().await;
          }
        }
      }
    }
  }
}
