//! HTTP implementation of the remote API contract.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use super::{ApiError, RemoteApi, SubmitReceipt};
use crate::config::Config;
use crate::queue::QueuedMutation;

/// Remote API client over HTTP with bearer-token auth.
#[derive(Clone)]
pub struct HttpApi {
  http: reqwest::Client,
  base_url: String,
  token: String,
}

impl HttpApi {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url: config.api.base_url.trim_end_matches('/').to_string(),
      token,
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api/{}", self.base_url, path)
  }

  /// Map a response status onto the error taxonomy.
  async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
      return Err(ApiError::AuthExpired);
    }
    if status.is_client_error() {
      let message = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
      return Err(ApiError::Rejected(message));
    }
    if status.is_server_error() {
      // The server may not have seen the request body; retriable
      return Err(ApiError::Transport(format!("server error: {}", status)));
    }

    Ok(response)
  }
}

#[async_trait]
impl RemoteApi for HttpApi {
  async fn submit(&self, mutation: &QueuedMutation) -> Result<SubmitReceipt, ApiError> {
    let response = self
      .http
      .post(self.url("mutations"))
      .bearer_auth(&self.token)
      // The server deduplicates on this, making replays safe
      .header("Idempotency-Key", &mutation.id)
      .json(mutation)
      .send()
      .await
      .map_err(|e| ApiError::Transport(e.to_string()))?;

    let response = Self::check(response).await?;
    response
      .json()
      .await
      .map_err(|e| ApiError::Transport(e.to_string()))
  }

  async fn fetch_json(&self, path: &str) -> Result<Value, ApiError> {
    let response = self
      .http
      .get(self.url(path))
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(|e| ApiError::Transport(e.to_string()))?;

    let response = Self::check(response).await?;
    response
      .json()
      .await
      .map_err(|e| ApiError::Transport(e.to_string()))
  }
}
