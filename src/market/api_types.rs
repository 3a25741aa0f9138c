//! Serde-deserializable types matching market API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;
use std::collections::HashMap;

use super::types::{CoinDetail, MarketCoin, PricePoint};

/// Quote currency for every figure we keep
pub const VS_CURRENCY: &str = "usd";

// ============================================================================
// Markets list endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiMarketCoin {
  pub id: String,
  pub symbol: String,
  pub name: String,
  pub current_price: Option<f64>,
  pub market_cap: Option<f64>,
  pub market_cap_rank: Option<u32>,
  pub total_volume: Option<f64>,
  pub high_24h: Option<f64>,
  pub low_24h: Option<f64>,
  pub price_change_percentage_24h: Option<f64>,
}

impl From<ApiMarketCoin> for MarketCoin {
  fn from(coin: ApiMarketCoin) -> Self {
    Self {
      id: coin.id,
      symbol: coin.symbol,
      name: coin.name,
      current_price: coin.current_price,
      market_cap: coin.market_cap,
      market_cap_rank: coin.market_cap_rank,
      total_volume: coin.total_volume,
      high_24h: coin.high_24h,
      low_24h: coin.low_24h,
      price_change_percentage_24h: coin.price_change_percentage_24h,
    }
  }
}

// ============================================================================
// Coin detail endpoint
// ============================================================================

/// Per-currency figures, e.g. `{"usd": 42000.0, "eur": 39000.0}`
type CurrencyMap = HashMap<String, Option<f64>>;

fn in_usd(map: &CurrencyMap) -> Option<f64> {
  map.get(VS_CURRENCY).copied().flatten()
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiMarketData {
  #[serde(default)]
  pub current_price: CurrencyMap,
  #[serde(default)]
  pub high_24h: CurrencyMap,
  #[serde(default)]
  pub low_24h: CurrencyMap,
  pub price_change_24h: Option<f64>,
  pub price_change_percentage_24h: Option<f64>,
  #[serde(default)]
  pub market_cap: CurrencyMap,
  #[serde(default)]
  pub total_volume: CurrencyMap,
  pub circulating_supply: Option<f64>,
  pub total_supply: Option<f64>,
  pub max_supply: Option<f64>,
  #[serde(default)]
  pub ath: CurrencyMap,
  #[serde(default)]
  pub atl: CurrencyMap,
}

#[derive(Debug, Deserialize)]
pub struct ApiImage {
  pub large: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCoinDetail {
  pub id: String,
  pub symbol: String,
  pub name: String,
  #[serde(default)]
  pub description: HashMap<String, Option<String>>,
  pub image: Option<ApiImage>,
  pub market_cap_rank: Option<u32>,
  #[serde(default)]
  pub market_data: ApiMarketData,
}

impl From<ApiCoinDetail> for CoinDetail {
  fn from(coin: ApiCoinDetail) -> Self {
    let data = &coin.market_data;
    Self {
      description: coin
        .description
        .get("en")
        .cloned()
        .flatten()
        .unwrap_or_default(),
      image: coin.image.and_then(|i| i.large),
      market_cap_rank: coin.market_cap_rank,
      price: in_usd(&data.current_price),
      high_24h: in_usd(&data.high_24h),
      low_24h: in_usd(&data.low_24h),
      price_change_24h: data.price_change_24h,
      price_change_percentage_24h: data.price_change_percentage_24h,
      market_cap: in_usd(&data.market_cap),
      total_volume: in_usd(&data.total_volume),
      circulating_supply: data.circulating_supply,
      total_supply: data.total_supply,
      max_supply: data.max_supply,
      ath: in_usd(&data.ath),
      atl: in_usd(&data.atl),
      id: coin.id,
      symbol: coin.symbol,
      name: coin.name,
    }
  }
}

// ============================================================================
// Market chart range endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiMarketChart {
  /// `[timestamp_millis, price]` pairs
  #[serde(default)]
  pub prices: Vec<[f64; 2]>,
}

impl ApiMarketChart {
  pub fn into_points(self) -> Vec<PricePoint> {
    self
      .prices
      .into_iter()
      .map(|[timestamp, price]| PricePoint {
        timestamp_millis: timestamp as i64,
        price,
      })
      .collect()
  }
}
