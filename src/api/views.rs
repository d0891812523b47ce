//! Typed cache views for the resource families.
//!
//! Each view maps to one cached variant and one request path. Free-form
//! parameters are sha256-hashed into the variant so storage keys stay
//! fixed-length and delimiter-safe; the request path keeps the raw value.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::cache::{CacheKey, Family};

/// Stable fixed-length key fragment for a free-form parameter.
fn digest(input: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}

/// Challenge listing and detail views.
#[derive(Debug, Clone)]
pub enum ChallengeView {
  /// Challenges the user participates in.
  Mine,
  /// Publicly joinable challenges.
  Public,
  /// A single challenge by id.
  ById(String),
}

impl ChallengeView {
  /// API request path backing this view.
  pub fn request_path(&self) -> String {
    match self {
      Self::Mine => "challenges/mine".to_string(),
      Self::Public => "challenges/public".to_string(),
      Self::ById(id) => format!("challenges/{}", id),
    }
  }
}

impl CacheKey for ChallengeView {
  fn family(&self) -> Family {
    Family::Challenges
  }

  fn variant(&self) -> String {
    match self {
      Self::Mine => "mine".to_string(),
      Self::Public => "public".to_string(),
      Self::ById(id) => format!("by_id_{}", digest(id)),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Mine => "my challenges".to_string(),
      Self::Public => "public challenges".to_string(),
      Self::ById(id) => format!("challenge {}", id),
    }
  }
}

/// Workout history views.
#[derive(Debug, Clone)]
pub enum WorkoutView {
  /// Most recent workouts across exercises.
  Recent,
  /// All workouts on one day.
  Day(NaiveDate),
}

impl WorkoutView {
  pub fn request_path(&self) -> String {
    match self {
      Self::Recent => "workouts/recent".to_string(),
      Self::Day(day) => format!("workouts?day={}", day.format("%Y-%m-%d")),
    }
  }
}

impl CacheKey for WorkoutView {
  fn family(&self) -> Family {
    Family::Workouts
  }

  fn variant(&self) -> String {
    match self {
      Self::Recent => "recent".to_string(),
      // Dates are already key-safe, no hashing needed
      Self::Day(day) => format!("day_{}", day.format("%Y-%m-%d")),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Recent => "recent workouts".to_string(),
      Self::Day(day) => format!("workouts on {}", day),
    }
  }
}

/// Chart series views.
#[derive(Debug, Clone)]
pub enum ChartView {
  PersonalWeekly,
  PersonalMonthly,
  /// Progress series for one exercise.
  Exercise(String),
}

impl ChartView {
  pub fn request_path(&self) -> String {
    match self {
      Self::PersonalWeekly => "charts/personal/weekly".to_string(),
      Self::PersonalMonthly => "charts/personal/monthly".to_string(),
      Self::Exercise(name) => format!("charts/exercise/{}", name),
    }
  }
}

impl CacheKey for ChartView {
  fn family(&self) -> Family {
    Family::ChartData
  }

  fn variant(&self) -> String {
    match self {
      Self::PersonalWeekly => "personal_weekly".to_string(),
      Self::PersonalMonthly => "personal_monthly".to_string(),
      Self::Exercise(name) => format!("exercise_{}", digest(name)),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::PersonalWeekly => "weekly chart".to_string(),
      Self::PersonalMonthly => "monthly chart".to_string(),
      Self::Exercise(name) => format!("{} chart", name),
    }
  }
}

/// The user's own aggregate statistics. Single variant.
#[derive(Debug, Clone)]
pub struct ProfileView;

impl ProfileView {
  pub fn request_path(&self) -> String {
    "profile/stats".to_string()
  }
}

impl CacheKey for ProfileView {
  fn family(&self) -> Family {
    Family::ProfileStats
  }

  fn variant(&self) -> String {
    "me".to_string()
  }

  fn description(&self) -> String {
    "profile stats".to_string()
  }
}

/// Leaderboard views.
#[derive(Debug, Clone)]
pub enum LeaderboardView {
  Global,
  Friends,
  /// Standings within one challenge.
  Challenge(String),
}

impl LeaderboardView {
  pub fn request_path(&self) -> String {
    match self {
      Self::Global => "leaderboard/global".to_string(),
      Self::Friends => "leaderboard/friends".to_string(),
      Self::Challenge(id) => format!("challenges/{}/leaderboard", id),
    }
  }
}

impl CacheKey for LeaderboardView {
  fn family(&self) -> Family {
    Family::Leaderboard
  }

  fn variant(&self) -> String {
    match self {
      Self::Global => "global".to_string(),
      Self::Friends => "friends".to_string(),
      Self::Challenge(id) => format!("challenge_{}", digest(id)),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Global => "global leaderboard".to_string(),
      Self::Friends => "friends leaderboard".to_string(),
      Self::Challenge(id) => format!("leaderboard for challenge {}", id),
    }
  }
}
