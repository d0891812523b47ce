use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::Family;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Storage key namespace, prefixed to every cache and queue key.
  #[serde(default = "default_namespace")]
  pub namespace: String,
  /// Override for the cache database location.
  pub db_path: Option<PathBuf>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Per-family TTL overrides in seconds, keyed by family name
  /// (e.g. `challenges: 120`). Unknown names are rejected at load.
  #[serde(default)]
  pub ttl_secs: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Deadline for a single queued-mutation replay.
  #[serde(default = "default_replay_timeout_secs")]
  pub replay_timeout_secs: u64,
  /// How often the periodic drain runs when the queue is non-empty.
  #[serde(default = "default_drain_interval_secs")]
  pub drain_interval_secs: u64,
}

fn default_namespace() -> String {
  "repsync".to_string()
}

fn default_replay_timeout_secs() -> u64 {
  30
}

fn default_drain_interval_secs() -> u64 {
  300
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      replay_timeout_secs: default_replay_timeout_secs(),
      drain_interval_secs: default_drain_interval_secs(),
    }
  }
}

impl SyncConfig {
  pub fn replay_timeout(&self) -> Duration {
    Duration::from_secs(self.replay_timeout_secs)
  }

  pub fn drain_interval(&self) -> Duration {
    Duration::from_secs(self.drain_interval_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./repsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/repsync/config.yaml
  /// 4. ~/.config/repsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/repsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("repsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("repsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    // Fail on typoed family names up front instead of silently ignoring them
    for name in config.cache.ttl_secs.keys() {
      if Family::parse(name).is_none() {
        return Err(eyre!("Unknown cache family in config: {}", name));
      }
    }

    Ok(config)
  }

  /// Per-family TTL overrides, ready for the cache store.
  pub fn ttl_overrides(&self) -> Vec<(Family, chrono::Duration)> {
    self
      .cache
      .ttl_secs
      .iter()
      .filter_map(|(name, secs)| {
        Family::parse(name).map(|f| (f, chrono::Duration::seconds(*secs as i64)))
      })
      .collect()
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks REPSYNC_API_TOKEN first, then API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("REPSYNC_API_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set REPSYNC_API_TOKEN or API_TOKEN environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config: Config = serde_yaml::from_str(
      r#"
api:
  base_url: https://api.repsync.example
"#,
    )
    .unwrap();

    assert_eq!(config.namespace, "repsync");
    assert_eq!(config.sync.replay_timeout(), Duration::from_secs(30));
    assert!(config.ttl_overrides().is_empty());
  }

  #[test]
  fn test_ttl_overrides_parse_to_families() {
    let config: Config = serde_yaml::from_str(
      r#"
api:
  base_url: https://api.repsync.example
cache:
  ttl_secs:
    challenges: 120
    leaderboard: 15
"#,
    )
    .unwrap();

    let overrides = config.ttl_overrides();
    assert!(overrides.contains(&(Family::Challenges, chrono::Duration::seconds(120))));
    assert!(overrides.contains(&(Family::Leaderboard, chrono::Duration::seconds(15))));
  }

  #[test]
  fn test_unknown_family_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
      &path,
      r#"
api:
  base_url: https://api.repsync.example
cache:
  ttl_secs:
    challanges: 120
"#,
    )
    .unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("challanges"));
  }
}
