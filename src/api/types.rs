//! Domain payload types exchanged with the API.
//!
//! These are plain documents; all exercise/XP rules live server-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A workout log entry as the user submitted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutEntry {
  pub exercise: String,
  /// Reps, seconds, meters — whatever the exercise counts in.
  pub amount: u32,
  pub sets: u32,
  /// When the user performed the workout, not when it reached the server.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub performed_at: DateTime<Utc>,
}

/// A workout as it appears in history views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutSummary {
  pub id: String,
  pub exercise: String,
  pub amount: u32,
  pub sets: u32,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub performed_at: DateTime<Utc>,
}

/// A challenge as listed in challenge views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
  pub id: String,
  pub name: String,
  pub exercise: String,
  pub goal: u32,
  pub participants: u32,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub ends_at: DateTime<Utc>,
}

/// Request body for creating a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChallenge {
  pub name: String,
  pub exercise: String,
  pub goal: u32,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub ends_at: DateTime<Utc>,
}

/// Aggregate profile statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileStats {
  pub total_reps: u64,
  pub total_workouts: u64,
  pub xp: u64,
  pub streak_days: u32,
}

/// One row of a leaderboard view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRow {
  pub user_id: String,
  pub display_name: String,
  pub score: u64,
  pub rank: u32,
}

/// One point of a chart series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartPoint {
  /// Bucket label ("2026-08-03", "W31", ...).
  pub label: String,
  pub value: f64,
}
