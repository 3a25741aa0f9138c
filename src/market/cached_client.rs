//! Cached market client that wraps MarketClient with transparent caching.

use color_eyre::Result;
use std::sync::Arc;

use crate::cache::{CacheLayer, CacheResult, KeyValueStore};
use crate::config::{CacheConfig, Config};
use crate::fetch::{Clock, FetchError, RequestQueue};

use super::cache::{normalize_id, scope_for, MarketQueryKey, ScopedKey};
use super::client::MarketClient;
use super::types::{CoinDetail, MarketCoin, PricePoint, TimePeriod};

/// Market client with transparent caching support.
///
/// This wraps the underlying MarketClient and provides the same API, but
/// serves fresh results from the store and funnels every upstream call
/// through one throttled queue.
#[derive(Clone)]
pub struct CachedMarketClient {
  inner: MarketClient,
  cache: CacheLayer<dyn KeyValueStore>,
  ttls: CacheConfig,
  scope: String,
  clock: Arc<dyn Clock>,
}

impl CachedMarketClient {
  /// Create a new cached market client. Must be called from within a tokio runtime.
  pub fn new(
    config: &Config,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
  ) -> Result<Self> {
    let inner = MarketClient::new(&config.api, config.fetch.retry_policy(), Arc::clone(&clock))?;
    let queue = RequestQueue::new(Arc::clone(&clock), config.fetch.queue_delay());
    let cache = CacheLayer::new(storage, queue, Arc::clone(&clock))
      .with_dedupe(config.fetch.dedupe_in_flight);
    let scope = scope_for(inner.base_url());

    Ok(Self {
      inner,
      cache,
      ttls: config.cache.clone(),
      scope,
      clock,
    })
  }

  /// Get the top coins by market cap with caching.
  pub async fn markets(&self) -> Result<CacheResult<Vec<MarketCoin>>, FetchError> {
    let query_key = MarketQueryKey::Markets;
    let inner = self.inner.clone();

    self
      .cache
      .fetch(
        &self.scoped(&query_key),
        query_key.ttl(&self.ttls),
        move || async move { inner.get_markets().await },
      )
      .await
  }

  /// Get coin details with caching.
  pub async fn coin(&self, id: &str) -> Result<CacheResult<CoinDetail>, FetchError> {
    let id = normalize_id(id);
    let query_key = MarketQueryKey::CoinDetail { id: id.clone() };
    let inner = self.inner.clone();

    self
      .cache
      .fetch(
        &self.scoped(&query_key),
        query_key.ttl(&self.ttls),
        move || async move { inner.get_coin(&id).await },
      )
      .await
  }

  /// Get the price chart for a period with caching.
  ///
  /// The time window is computed when the request actually runs, not when
  /// it is queued.
  pub async fn chart(
    &self,
    id: &str,
    period: TimePeriod,
  ) -> Result<CacheResult<Vec<PricePoint>>, FetchError> {
    let id = normalize_id(id);
    let query_key = MarketQueryKey::Chart {
      id: id.clone(),
      period,
    };
    let inner = self.inner.clone();
    let clock = Arc::clone(&self.clock);

    self
      .cache
      .fetch(
        &self.scoped(&query_key),
        query_key.ttl(&self.ttls),
        move || async move {
          let (from, to) = period.range(clock.now_millis() / 1000);
          inner.get_chart(&id, from, to).await
        },
      )
      .await
  }

  /// Drop every cached response.
  pub fn clear_cache(&self) -> Result<usize> {
    self.cache.clear()
  }

  fn scoped<'a>(&'a self, key: &'a MarketQueryKey) -> ScopedKey<'a, MarketQueryKey> {
    ScopedKey {
      scope: &self.scope,
      key,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, MemoryStore};
  use crate::fetch::ManualClock;

  fn offline_config() -> Config {
    let mut config = Config::default();
    // Nothing listens here; any upstream call fails fast
    config.api.base_url = "http://127.0.0.1:9/api/v3".to_string();
    config.fetch.max_attempts = 1;
    config
  }

  #[tokio::test]
  async fn test_serves_seeded_entry_without_network() {
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let store = Arc::new(MemoryStore::new());
    let client =
      CachedMarketClient::new(&offline_config(), store.clone(), Arc::new(clock.clone())).unwrap();

    let key = format!("{}:cryptoDetail_bitcoin", client.scope);
    let detail = serde_json::json!({
      "id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "market_cap_rank": 1,
      "description": "", "image": null, "price": 43000.0, "high_24h": null,
      "low_24h": null, "price_change_24h": null, "price_change_percentage_24h": null,
      "market_cap": null, "total_volume": null, "circulating_supply": null,
      "total_supply": null, "max_supply": null, "ath": null, "atl": null
    });
    store.set(&key, &detail.to_string()).unwrap();
    store
      .set(&format!("{}_timestamp", key), "1699999990000")
      .unwrap();

    let result = client.coin(" Bitcoin ").await.unwrap();

    assert_eq!(result.source, CacheSource::CacheFresh);
    assert_eq!(result.data.price, Some(43000.0));
  }

  #[tokio::test]
  async fn test_network_failure_surfaces_as_transport_error() {
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let client = CachedMarketClient::new(
      &offline_config(),
      Arc::new(MemoryStore::new()),
      Arc::new(clock),
    )
    .unwrap();

    let result = client.chart("bitcoin", TimePeriod::SevenDays).await;

    assert!(matches!(result, Err(FetchError::TransportFailure(_))));
  }

  #[tokio::test]
  async fn test_clear_cache_empties_store() {
    let store = Arc::new(MemoryStore::new());
    store.set("a", "1").unwrap();
    let client = CachedMarketClient::new(
      &offline_config(),
      store.clone(),
      Arc::new(ManualClock::default()),
    )
    .unwrap();

    assert_eq!(client.clear_cache().unwrap(), 1);
    assert_eq!(store.get("a").unwrap(), None);
  }
}
