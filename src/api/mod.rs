//! Remote API contract and its HTTP implementation.

mod http;
pub mod types;
pub mod views;

pub use http::HttpApi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::queue::QueuedMutation;

/// Errors from the remote API, split the way callers must react to them.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The request never completed: offline, DNS, timeout, server down.
  /// Mutations hit by this are queued for replay.
  #[error("transport error: {0}")]
  Transport(String),

  /// The server understood the request and said no (validation failure).
  /// Never queued and never retried; retrying fails identically.
  #[error("rejected by server: {0}")]
  Rejected(String),

  /// Credentials expired. The mutation is neither discarded nor retried; the
  /// caller refreshes the token and resubmits.
  #[error("authentication expired")]
  AuthExpired,
}

/// Server confirmation of a committed mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
  /// Server-side document id of the committed mutation.
  pub server_id: String,
  /// Server-authoritative amount, for reconciling optimistic local totals.
  pub amount: i64,
}

/// The operations this layer needs from the remote document-store API.
///
/// Token attachment and refresh are the implementation's concern; callers
/// only ever see the three-way [`ApiError`] split.
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
  /// Submit a mutation. Implementations must be idempotent on
  /// `mutation.id` so a replay after a lost response cannot double-count.
  async fn submit(&self, mutation: &QueuedMutation) -> Result<SubmitReceipt, ApiError>;

  /// Fetch the resource behind one cached view, as raw JSON.
  async fn fetch_json(&self, path: &str) -> Result<Value, ApiError>;
}
