use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ApiConfig, Config};
use crate::fetch::{fetch_with_retry, Clock, FetchError, RetryPolicy};
use crate::market::api_types::{
  ApiCoinDetail, ApiMarketChart, ApiMarketCoin, VS_CURRENCY,
};
use crate::market::types::{CoinDetail, MarketCoin, PricePoint};

/// Header carrying the optional API key
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// Number of coins requested for the markets list
const MARKETS_PER_PAGE: u32 = 100;

/// Market data API client wrapper
#[derive(Clone)]
pub struct MarketClient {
  http: reqwest::Client,
  base_url: Url,
  api_key: Option<String>,
  clock: Arc<dyn Clock>,
  retry: RetryPolicy,
}

impl MarketClient {
  pub fn new(api: &ApiConfig, retry: RetryPolicy, clock: Arc<dyn Clock>) -> Result<Self> {
    let base_url = Url::parse(&api.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", api.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API base URL {} cannot have a path", api.base_url));
    }

    let http = reqwest::Client::builder()
      .user_agent(concat!("coinfetch/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      api_key: Config::get_api_key(),
      clock,
      retry,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Get the top coins by market cap
  pub async fn get_markets(&self) -> Result<Vec<MarketCoin>, FetchError> {
    let coins: Vec<ApiMarketCoin> = self
      .get_json(
        &["coins", "markets"],
        &[
          ("vs_currency", VS_CURRENCY.to_string()),
          ("order", "market_cap_desc".to_string()),
          ("per_page", MARKETS_PER_PAGE.to_string()),
          ("page", "1".to_string()),
          ("sparkline", "false".to_string()),
        ],
      )
      .await?;

    Ok(coins.into_iter().map(MarketCoin::from).collect())
  }

  /// Get details and market statistics for one coin
  pub async fn get_coin(&self, id: &str) -> Result<CoinDetail, FetchError> {
    let coin: ApiCoinDetail = self
      .get_json(
        &["coins", id],
        &[
          ("localization", "false".to_string()),
          ("tickers", "false".to_string()),
          ("market_data", "true".to_string()),
          ("community_data", "false".to_string()),
          ("developer_data", "false".to_string()),
          ("sparkline", "true".to_string()),
        ],
      )
      .await?;

    Ok(coin.into())
  }

  /// Get USD price history between two Unix timestamps (seconds).
  ///
  /// Upstream picks the resolution from the length of the range.
  pub async fn get_chart(&self, id: &str, from: i64, to: i64) -> Result<Vec<PricePoint>, FetchError> {
    let chart: ApiMarketChart = self
      .get_json(
        &["coins", id, "market_chart", "range"],
        &[
          ("vs_currency", VS_CURRENCY.to_string()),
          ("from", from.to_string()),
          ("to", to.to_string()),
        ],
      )
      .await?;

    Ok(chart.into_points())
  }

  fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
    let mut url = self.base_url.clone();
    // Checked in new(): the base URL can have path segments
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    if !query.is_empty() {
      url
        .query_pairs_mut()
        .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    url
  }

  /// GET a JSON document, retrying rate limits and transport failures.
  async fn get_json<T: DeserializeOwned>(
    &self,
    segments: &[&str],
    query: &[(&str, String)],
  ) -> Result<T, FetchError> {
    let url = self.endpoint(segments, query);
    debug!(%url, "GET");

    let response = fetch_with_retry(self.clock.as_ref(), self.retry, || {
      let mut request = self.http.get(url.clone());
      if let Some(key) = &self.api_key {
        request = request.header(API_KEY_HEADER, key);
      }
      request.send()
    })
    .await?;

    let status = response.status();
    if let Some(err) = FetchError::from_status(status) {
      warn!(%url, %status, "Request failed");
      return Err(err);
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| FetchError::MalformedResponse(e.to_string()))
  }
}
