//! Cache families and the declared invalidation/TTL table.
//!
//! Families are the unit of invalidation; variants are the unit of storage.
//! Everything policy-shaped about a family (how long its entries stay fresh,
//! which other families derive from its data) is declared once in the table
//! here rather than re-derived at call sites.

use chrono::Duration;

/// A named group of cache entries that are invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
  /// Workout log history views.
  Workouts,
  /// Challenge listings and details.
  Challenges,
  /// Aggregate profile statistics (totals, XP, streak).
  ProfileStats,
  /// Chart series derived from workout data.
  ChartData,
  /// Leaderboard standings.
  Leaderboard,
}

/// Per-family cache policy, declared once.
#[derive(Debug)]
pub struct FamilySpec {
  ttl_secs: i64,
  max_age_secs: i64,
  /// Families whose cached views are derived from this family's data and must
  /// be cleared whenever it is invalidated.
  pub dependents: &'static [Family],
}

impl FamilySpec {
  /// Age under which entries are served with no background work.
  pub fn ttl(&self) -> Duration {
    Duration::seconds(self.ttl_secs)
  }

  /// Hard cutoff past which entries are treated as absent.
  pub fn max_age(&self) -> Duration {
    Duration::seconds(self.max_age_secs)
  }
}

// Anything rendered from workout data goes stale the moment a workout lands,
// hence the wide dependents list on Workouts.
const WORKOUTS: FamilySpec = FamilySpec {
  ttl_secs: 120,
  max_age_secs: 86_400,
  dependents: &[Family::ProfileStats, Family::ChartData, Family::Leaderboard],
};

const CHALLENGES: FamilySpec = FamilySpec {
  ttl_secs: 300,
  max_age_secs: 86_400,
  dependents: &[Family::Leaderboard],
};

const PROFILE_STATS: FamilySpec = FamilySpec {
  ttl_secs: 300,
  max_age_secs: 86_400,
  dependents: &[],
};

const CHART_DATA: FamilySpec = FamilySpec {
  ttl_secs: 600,
  max_age_secs: 86_400,
  dependents: &[],
};

const LEADERBOARD: FamilySpec = FamilySpec {
  ttl_secs: 60,
  max_age_secs: 3_600,
  dependents: &[],
};

impl Family {
  pub const ALL: [Family; 5] = [
    Family::Workouts,
    Family::Challenges,
    Family::ProfileStats,
    Family::ChartData,
    Family::Leaderboard,
  ];

  /// Name used in storage keys and logs.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Workouts => "workouts",
      Self::Challenges => "challenges",
      Self::ProfileStats => "profile-stats",
      Self::ChartData => "chart-data",
      Self::Leaderboard => "leaderboard",
    }
  }

  /// Parse a family name as it appears in config files and storage keys.
  pub fn parse(name: &str) -> Option<Family> {
    Family::ALL.iter().copied().find(|f| f.as_str() == name)
  }

  /// The declared policy for this family.
  pub fn spec(&self) -> &'static FamilySpec {
    match self {
      Self::Workouts => &WORKOUTS,
      Self::Challenges => &CHALLENGES,
      Self::ProfileStats => &PROFILE_STATS,
      Self::ChartData => &CHART_DATA,
      Self::Leaderboard => &LEADERBOARD,
    }
  }
}

/// Trait mapping a typed view to its cache family and variant key.
///
/// Implementors are the view enums in [`crate::api::views`]; parameterized
/// views hash their parameters into the variant so storage keys stay
/// fixed-length and delimiter-safe.
pub trait CacheKey {
  /// The family this view belongs to (and is invalidated with).
  fn family(&self) -> Family;

  /// Storage variant under the family.
  fn variant(&self) -> String;

  /// Human-readable form for logs.
  fn description(&self) -> String;
}
