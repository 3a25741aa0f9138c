//! Client for the public crypto market data API.

pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod types;

pub use cached_client::CachedMarketClient;
pub use types::{CoinDetail, MarketCoin, PricePoint, TimePeriod};
