use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::RetryPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub cache: CacheConfig,
  pub fetch: FetchConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Root of the market data REST API
  pub base_url: String,
  /// Per-request timeout in seconds
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.coingecko.com/api/v3".to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// SQLite file under the data directory (or `cache.path`)
  #[default]
  Sqlite,
  /// Kept for the lifetime of the process only
  Memory,
  /// Caching disabled
  None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub backend: CacheBackend,
  /// Override for the SQLite file location
  pub path: Option<PathBuf>,
  /// TTL for the markets list and coin details
  pub detail_ttl_secs: u64,
  /// TTL for price charts
  pub chart_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      backend: CacheBackend::Sqlite,
      path: None,
      detail_ttl_secs: 5 * 60,
      chart_ttl_secs: 10 * 60,
    }
  }
}

impl CacheConfig {
  pub fn detail_ttl(&self) -> Duration {
    Duration::from_secs(self.detail_ttl_secs)
  }

  pub fn chart_ttl(&self) -> Duration {
    Duration::from_secs(self.chart_ttl_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
  /// Total attempts per request, including the first
  pub max_attempts: u32,
  /// Delay before the first retry, doubled on every retry
  pub initial_delay_ms: u64,
  /// Pause between two queued requests
  pub queue_delay_ms: u64,
  /// Share one fetch between concurrent misses for the same key
  pub dedupe_in_flight: bool,
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      initial_delay_ms: 1000,
      queue_delay_ms: 1000,
      dedupe_in_flight: true,
    }
  }
}

impl FetchConfig {
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.max_attempts,
      initial_delay: Duration::from_millis(self.initial_delay_ms),
    }
  }

  pub fn queue_delay(&self) -> Duration {
    Duration::from_millis(self.queue_delay_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Level for this crate's events (overridden by RUST_LOG)
  pub level: String,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "warn".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./coinfetch.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/coinfetch/config.yaml
  ///
  /// Without a config file every setting takes its default.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("coinfetch.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("coinfetch").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file is a valid "all defaults" config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Get the optional API key from the environment.
  ///
  /// Checks COINFETCH_API_KEY.
  pub fn get_api_key() -> Option<String> {
    std::env::var("COINFETCH_API_KEY")
      .ok()
      .filter(|key| !key.trim().is_empty())
  }
}
