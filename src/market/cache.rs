//! Cache keys for market API reads.

use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

use crate::cache::CacheKey;
use crate::config::CacheConfig;

use super::types::TimePeriod;

// ============================================================================
// Query key types
// ============================================================================

/// Query key types for market API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketQueryKey {
  /// Top coins by market cap
  Markets,
  /// Details for one coin
  CoinDetail { id: String },
  /// Price history for one coin over a period
  Chart { id: String, period: TimePeriod },
}

impl MarketQueryKey {
  /// TTL category for this resource.
  pub fn ttl(&self, cache: &CacheConfig) -> Duration {
    match self {
      Self::Markets | Self::CoinDetail { .. } => cache.detail_ttl(),
      Self::Chart { .. } => cache.chart_ttl(),
    }
  }
}

impl CacheKey for MarketQueryKey {
  fn cache_key(&self) -> String {
    match self {
      Self::Markets => "cryptoData".to_string(),
      Self::CoinDetail { id } => format!("cryptoDetail_{}", id),
      Self::Chart { id, period } => format!("chartData_{}_{}", id, period),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Markets => "markets list".to_string(),
      Self::CoinDetail { id } => format!("coin {}", id),
      Self::Chart { id, period } => format!("{} chart for {}", period, id),
    }
  }
}

/// A key scoped to one upstream, so two API hosts never share entries.
pub struct ScopedKey<'a, K> {
  pub scope: &'a str,
  pub key: &'a K,
}

impl<K: CacheKey> CacheKey for ScopedKey<'_, K> {
  fn cache_key(&self) -> String {
    format!("{}:{}", self.scope, self.key.cache_key())
  }

  fn description(&self) -> String {
    self.key.description()
  }
}

/// Short stable scope for an API base URL.
pub fn scope_for(base_url: &Url) -> String {
  // SHA256 hash for a stable, fixed-length prefix
  let mut hasher = Sha256::new();
  hasher.update(base_url.as_str().trim_end_matches('/').as_bytes());
  let result = hasher.finalize();
  hex::encode(&result[..6])
}

/// Normalize a user supplied coin id for requests and cache keys.
/// Trims whitespace and lowercases, as upstream ids are lowercase.
pub fn normalize_id(id: &str) -> String {
  id.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_key_layout() {
    assert_eq!(MarketQueryKey::Markets.cache_key(), "cryptoData");
    assert_eq!(
      MarketQueryKey::CoinDetail {
        id: "bitcoin".to_string()
      }
      .cache_key(),
      "cryptoDetail_bitcoin"
    );
    assert_eq!(
      MarketQueryKey::Chart {
        id: "bitcoin".to_string(),
        period: TimePeriod::ThirtyDays
      }
      .cache_key(),
      "chartData_bitcoin_30D"
    );
  }

  #[test]
  fn test_ttl_categories() {
    let cache = CacheConfig::default();
    assert_eq!(MarketQueryKey::Markets.ttl(&cache), Duration::from_secs(300));
    let chart = MarketQueryKey::Chart {
      id: "eth".to_string(),
      period: TimePeriod::OneDay,
    };
    assert_eq!(chart.ttl(&cache), Duration::from_secs(600));
  }

  #[test]
  fn test_scope_ignores_trailing_slash() {
    let a = scope_for(&Url::parse("https://api.coingecko.com/api/v3").unwrap());
    let b = scope_for(&Url::parse("https://api.coingecko.com/api/v3/").unwrap());
    let other = scope_for(&Url::parse("https://pro-api.coingecko.com/api/v3").unwrap());

    assert_eq!(a, b);
    assert_ne!(a, other);
    assert_eq!(a.len(), 12);
  }

  #[test]
  fn test_scoped_key() {
    let key = MarketQueryKey::Markets;
    let scoped = ScopedKey {
      scope: "abc123",
      key: &key,
    };
    assert_eq!(scoped.cache_key(), "abc123:cryptoData");
    assert_eq!(scoped.description(), "markets list");
  }

  #[test]
  fn test_normalize_id() {
    assert_eq!(normalize_id("  Bitcoin "), "bitcoin");
  }
}
