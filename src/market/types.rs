use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Row of the markets list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCoin {
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

/// Full coin details, USD figures only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
  pub id: String,
  pub symbol: String,
  pub name: String,
  pub market_cap_rank: Option<u32>,
  /// English description, may contain HTML
  pub description: String,
  pub image: Option<String>,
  pub price: Option<f64>,
  pub high_24h: Option<f64>,
  pub low_24h: Option<f64>,
  pub price_change_24h: Option<f64>,
  pub price_change_percentage_24h: Option<f64>,
  pub market_cap: Option<f64>,
  pub total_volume: Option<f64>,
  pub circulating_supply: Option<f64>,
  pub total_supply: Option<f64>,
  pub max_supply: Option<f64>,
  pub ath: Option<f64>,
  pub atl: Option<f64>,
}

/// One point of a price chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
  pub timestamp_millis: i64,
  pub price: f64,
}

/// Chart time window, ending now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimePeriod {
  OneDay,
  #[default]
  SevenDays,
  FourteenDays,
  ThirtyDays,
  NinetyDays,
  OneYear,
}

impl TimePeriod {
  pub const ALL: [TimePeriod; 6] = [
    TimePeriod::OneDay,
    TimePeriod::SevenDays,
    TimePeriod::FourteenDays,
    TimePeriod::ThirtyDays,
    TimePeriod::NinetyDays,
    TimePeriod::OneYear,
  ];

  pub fn label(self) -> &'static str {
    match self {
      TimePeriod::OneDay => "1D",
      TimePeriod::SevenDays => "7D",
      TimePeriod::FourteenDays => "14D",
      TimePeriod::ThirtyDays => "30D",
      TimePeriod::NinetyDays => "90D",
      TimePeriod::OneYear => "1Y",
    }
  }

  pub fn days(self) -> i64 {
    match self {
      TimePeriod::OneDay => 1,
      TimePeriod::SevenDays => 7,
      TimePeriod::FourteenDays => 14,
      TimePeriod::ThirtyDays => 30,
      TimePeriod::NinetyDays => 90,
      TimePeriod::OneYear => 365,
    }
  }

  /// `(from, to)` in Unix seconds for a window ending at `now_secs`.
  pub fn range(self, now_secs: i64) -> (i64, i64) {
    (now_secs - self.days() * 24 * 60 * 60, now_secs)
  }
}

impl fmt::Display for TimePeriod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for TimePeriod {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim();
    TimePeriod::ALL
      .into_iter()
      .find(|p| p.label().eq_ignore_ascii_case(wanted))
      .ok_or_else(|| {
        let labels: Vec<_> = TimePeriod::ALL.iter().map(|p| p.label()).collect();
        format!("unknown period '{}', expected one of {}", s, labels.join(", "))
      })
  }
}
