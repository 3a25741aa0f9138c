//! Subcommands and their terminal rendering.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use color_eyre::Result;
use std::process::ExitCode;
use tracing::warn;

use crate::cache::{CacheResult, CacheSource};
use crate::fetch::FetchError;
use crate::format::{
  format_amount, format_compact_price, format_percent, format_price, format_volume,
};
use crate::market::{CachedMarketClient, CoinDetail, MarketCoin, PricePoint, TimePeriod};

/// Rows per page of the markets list
pub const PAGE_SIZE: usize = 20;

/// Characters of description shown unless `--full` is given
const DESCRIPTION_PREVIEW: usize = 240;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List the top coins by market cap
  Markets {
    /// Only show coins whose name or symbol contains this text
    #[arg(short, long)]
    search: Option<String>,
    /// Page to show, 20 coins per page
    #[arg(short, long, default_value_t = 1)]
    page: usize,
  },
  /// Show details for one coin
  Coin {
    /// Coin id, e.g. "bitcoin"
    id: String,
    /// Print the whole description
    #[arg(long)]
    full: bool,
  },
  /// Show price history for one coin
  Chart {
    /// Coin id, e.g. "bitcoin"
    id: String,
    /// Time window: 1D, 7D, 14D, 30D, 90D or 1Y
    #[arg(short, long, default_value_t = TimePeriod::default())]
    period: TimePeriod,
  },
  /// Manage the local response cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
  /// Delete every cached response
  Clear,
}

/// Run a command, printing its output.
///
/// Fetch failures are reported to the user and turned into a failing exit
/// code; only local problems (like the cache store) come back as errors.
pub async fn run(command: Command, client: &CachedMarketClient) -> Result<ExitCode> {
  let now = Utc::now();
  let rendered: Result<String, FetchError> = match command {
    Command::Markets { search, page } => client.markets().await.map(|result| {
      with_cache_note(
        render_markets(&result.data, search.as_deref(), page),
        &result,
        now,
      )
    }),
    Command::Coin { id, full } => client
      .coin(&id)
      .await
      .map(|result| with_cache_note(render_coin(&result.data, full), &result, now)),
    Command::Chart { id, period } => client
      .chart(&id, period)
      .await
      .map(|result| with_cache_note(render_chart(&result.data, period), &result, now)),
    Command::Cache {
      action: CacheAction::Clear,
    } => {
      let removed = client.clear_cache()?;
      Ok(format!("Removed {} cached values", removed))
    }
  };

  match rendered {
    Ok(text) => {
      println!("{}", text);
      Ok(ExitCode::SUCCESS)
    }
    Err(e) => {
      warn!(error = %e, "Command failed");
      eprintln!("Error: {}", e.user_message());
      Ok(ExitCode::FAILURE)
    }
  }
}

/// Coins whose name or symbol contains `search`, case-insensitively.
pub fn filter_coins<'a>(coins: &'a [MarketCoin], search: Option<&str>) -> Vec<&'a MarketCoin> {
  let needle = search.map(|s| s.trim().to_lowercase()).unwrap_or_default();
  coins
    .iter()
    .filter(|c| {
      needle.is_empty()
        || c.name.to_lowercase().contains(&needle)
        || c.symbol.to_lowercase().contains(&needle)
    })
    .collect()
}

/// Slice out a 1-based page. Returns the page and the total page count.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> (&[T], usize) {
  let total_pages = items.len().div_ceil(per_page.max(1));
  let start = page.saturating_sub(1).saturating_mul(per_page);
  if start >= items.len() {
    return (&items[..0], total_pages);
  }
  let end = (start + per_page).min(items.len());
  (&items[start..end], total_pages)
}

pub fn render_markets(coins: &[MarketCoin], search: Option<&str>, page: usize) -> String {
  let matches = filter_coins(coins, search);
  if matches.is_empty() {
    return "No coins found".to_string();
  }
  let (rows, total_pages) = paginate(&matches, page, PAGE_SIZE);

  let mut out = format!(
    "{:>4}  {:<24} {:<8} {:>16} {:>9} {:>12} {:>12}\n",
    "#", "Name", "Symbol", "Price", "24h", "Volume", "Market Cap"
  );
  for coin in rows {
    out.push_str(&format!(
      "{:>4}  {:<24} {:<8} {:>16} {:>9} {:>12} {:>12}\n",
      coin
        .market_cap_rank
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".to_string()),
      truncate(&coin.name, 24),
      coin.symbol.to_uppercase(),
      or_dash(coin.current_price, format_compact_price),
      or_dash(coin.price_change_percentage_24h, format_percent),
      or_dash(coin.total_volume, format_volume),
      or_dash(coin.market_cap, format_volume),
    ));
  }
  out.push_str(&format!("Page {} of {}", page.max(1), total_pages));
  out
}

pub fn render_coin(detail: &CoinDetail, full: bool) -> String {
  let mut out = format!("{} ({})", detail.name, detail.symbol.to_uppercase());
  if let Some(rank) = detail.market_cap_rank {
    out.push_str(&format!("  #{}", rank));
  }
  out.push('\n');

  let price = or_dash(detail.price, format_price);
  match (detail.price_change_24h, detail.price_change_percentage_24h) {
    (Some(change), Some(percent)) => out.push_str(&format!(
      "{}  {} ({}) today\n",
      price,
      format_price(change),
      format_percent(percent)
    )),
    _ => out.push_str(&format!("{}\n", price)),
  }

  let symbol = detail.symbol.to_uppercase();
  let supply = |v: Option<f64>| {
    v.map(|v| format!("{} {}", format_amount(v), symbol))
      .unwrap_or_else(|| "-".to_string())
  };
  let rows = [
    ("24h High", or_dash(detail.high_24h, format_price)),
    ("24h Low", or_dash(detail.low_24h, format_price)),
    ("Market Cap", or_dash(detail.market_cap, format_volume)),
    ("Volume (24h)", or_dash(detail.total_volume, format_volume)),
    ("Circulating Supply", supply(detail.circulating_supply)),
    ("Total Supply", supply(detail.total_supply)),
    ("Max Supply", supply(detail.max_supply)),
    ("All-Time High", or_dash(detail.ath, format_price)),
    ("All-Time Low", or_dash(detail.atl, format_price)),
  ];
  out.push('\n');
  for (label, value) in rows {
    out.push_str(&format!("{:<20} {}\n", label, value));
  }

  let description = strip_html(&detail.description);
  if !description.is_empty() {
    out.push('\n');
    if full || description.chars().count() <= DESCRIPTION_PREVIEW {
      out.push_str(&description);
    } else {
      out.push_str(&truncate(&description, DESCRIPTION_PREVIEW));
      out.push_str("\n(use --full for the whole description)");
    }
    out.push('\n');
  }

  out.trim_end().to_string()
}

pub fn render_chart(points: &[PricePoint], period: TimePeriod) -> String {
  if points.is_empty() {
    return format!("No price data for {}", period);
  }

  // Short windows get times, long ones only dates
  let pattern = if period == TimePeriod::OneDay {
    "%Y-%m-%d %H:%M"
  } else {
    "%Y-%m-%d"
  };

  let mut out = String::new();
  for point in points {
    let when = DateTime::from_timestamp_millis(point.timestamp_millis)
      .map(|d| d.format(pattern).to_string())
      .unwrap_or_else(|| "?".to_string());
    out.push_str(&format!("{:<16}  {:>16}\n", when, format_price(point.price)));
  }

  let first = points[0].price;
  let last = points[points.len() - 1].price;
  if first != 0.0 {
    out.push_str(&format!(
      "{} change: {}",
      period,
      format_percent((last - first) / first * 100.0)
    ));
  }
  out.trim_end().to_string()
}

/// Append a note saying how old cached output is.
fn with_cache_note<T>(text: String, result: &CacheResult<T>, now: DateTime<Utc>) -> String {
  match (result.source, result.cached_at) {
    (CacheSource::CacheFresh, Some(cached_at)) => {
      let age = (now - cached_at).num_seconds().max(0);
      format!("{}\n(cached {} ago)", text, describe_age(age))
    }
    _ => text,
  }
}

fn describe_age(seconds: i64) -> String {
  if seconds < 60 {
    format!("{}s", seconds)
  } else {
    format!("{}m", seconds / 60)
  }
}

fn or_dash(value: Option<f64>, format: fn(f64) -> String) -> String {
  value.map(format).unwrap_or_else(|| "-".to_string())
}

/// Cut to `max` characters, marking the cut with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    return s.to_string();
  }
  let mut cut: String = s.chars().take(max.saturating_sub(1)).collect();
  cut.push('…');
  cut
}

/// Common entities in upstream descriptions. `&amp;` goes last so an escaped
/// entity like `&amp;lt;` decodes to the literal `&lt;`.
const HTML_ENTITIES: &[(&str, &str)] = &[
  ("&quot;", "\""),
  ("&#39;", "'"),
  ("&#x27;", "'"),
  ("&apos;", "'"),
  ("&lt;", "<"),
  ("&gt;", ">"),
  ("&nbsp;", " "),
  ("&amp;", "&"),
];

/// Drop HTML tags from upstream descriptions and decode common entities.
/// Other numeric entities are left as written.
pub fn strip_html(html: &str) -> String {
  let mut text = String::with_capacity(html.len());
  let mut in_tag = false;
  for ch in html.chars() {
    match ch {
      '<' => in_tag = true,
      '>' if in_tag => in_tag = false,
      _ if !in_tag => text.push(ch),
      _ => {}
    }
  }
  HTML_ENTITIES
    .iter()
    .fold(text, |text, (entity, decoded)| text.replace(entity, decoded))
    .trim()
    .to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn coin(id: &str, name: &str, symbol: &str, rank: u32) -> MarketCoin {
    MarketCoin {
      id: id.to_string(),
      symbol: symbol.to_string(),
      name: name.to_string(),
      current_price: Some(1.5),
      market_cap: Some(2.0e9),
      market_cap_rank: Some(rank),
      total_volume: Some(3.0e6),
      high_24h: None,
      low_24h: None,
      price_change_percentage_24h: Some(-2.0),
    }
  }

  #[test]
  fn test_filter_matches_name_or_symbol() {
    let coins = vec![
      coin("bitcoin", "Bitcoin", "btc", 1),
      coin("ethereum", "Ethereum", "eth", 2),
      coin("wrapped-bitcoin", "Wrapped Bitcoin", "wbtc", 15),
    ];

    let ids: Vec<_> = filter_coins(&coins, Some("BTC"))
      .iter()
      .map(|c| c.id.as_str())
      .collect();
    assert_eq!(ids, vec!["bitcoin", "wrapped-bitcoin"]);

    assert_eq!(filter_coins(&coins, Some("ether")).len(), 1);
    assert_eq!(filter_coins(&coins, None).len(), 3);
  }

  #[test]
  fn test_paginate() {
    let items: Vec<u32> = (1..=45).collect();

    let (first, total) = paginate(&items, 1, 20);
    assert_eq!(total, 3);
    assert_eq!(first.len(), 20);

    let (last, _) = paginate(&items, 3, 20);
    assert_eq!(last, &[41, 42, 43, 44, 45]);

    let (beyond, _) = paginate(&items, 9, 20);
    assert!(beyond.is_empty());
  }

  #[test]
  fn test_render_markets_rows() {
    let coins = vec![coin("bitcoin", "Bitcoin", "btc", 1)];
    let text = render_markets(&coins, None, 1);

    assert!(text.contains("BTC"));
    assert!(text.contains("$1.50"));
    assert!(text.contains("-2.00%"));
    assert!(text.contains("$2.00B"));
    assert!(text.ends_with("Page 1 of 1"));
  }

  #[test]
  fn test_render_markets_without_matches() {
    let coins = vec![coin("bitcoin", "Bitcoin", "btc", 1)];
    assert_eq!(render_markets(&coins, Some("doge"), 1), "No coins found");
  }

  #[test]
  fn test_render_coin_truncates_description() {
    let detail = CoinDetail {
      id: "bitcoin".to_string(),
      symbol: "btc".to_string(),
      name: "Bitcoin".to_string(),
      market_cap_rank: Some(1),
      description: format!("<p>{}</p>", "a".repeat(500)),
      image: None,
      price: Some(43000.0),
      high_24h: None,
      low_24h: None,
      price_change_24h: Some(-100.0),
      price_change_percentage_24h: Some(-0.23),
      market_cap: None,
      total_volume: None,
      circulating_supply: Some(19_600_000.0),
      total_supply: None,
      max_supply: Some(21_000_000.0),
      ath: None,
      atl: None,
    };

    let short = render_coin(&detail, false);
    assert!(short.starts_with("Bitcoin (BTC)  #1"));
    assert!(short.contains("$43,000.00  -$100.00 (-0.23%) today"));
    assert!(short.contains("19,600,000 BTC"));
    assert!(short.contains("--full"));
    assert!(!short.contains("<p>"));

    let full = render_coin(&detail, true);
    assert!(full.contains(&"a".repeat(500)));
  }

  #[test]
  fn test_render_chart() {
    let points = vec![
      PricePoint {
        timestamp_millis: 1_700_000_000_000,
        price: 100.0,
      },
      PricePoint {
        timestamp_millis: 1_700_086_400_000,
        price: 110.0,
      },
    ];

    let text = render_chart(&points, TimePeriod::SevenDays);
    assert!(text.contains("2023-11-14"));
    assert!(text.contains("$110.00"));
    assert!(text.ends_with("7D change: +10.00%"));

    assert_eq!(render_chart(&[], TimePeriod::OneYear), "No price data for 1Y");
  }

  #[test]
  fn test_cache_note_only_for_cached_results() {
    let now = DateTime::from_timestamp(1_700_000_300, 0).unwrap();
    let cached_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    let cached = CacheResult::from_cache((), cached_at);
    assert_eq!(
      with_cache_note("x".to_string(), &cached, now),
      "x\n(cached 5m ago)"
    );

    let fresh = CacheResult::from_network(());
    assert_eq!(with_cache_note("x".to_string(), &fresh, now), "x");
  }

  #[test]
  fn test_strip_html() {
    assert_eq!(
      strip_html("<p>Bitcoin &amp; <a href=\"x\">friends</a></p>"),
      "Bitcoin & friends"
    );
  }

  #[test]
  fn test_strip_html_decodes_common_entities() {
    assert_eq!(
      strip_html("<p>&quot;Digital gold&quot; isn&#39;t &lt;just&gt; a meme</p>"),
      "\"Digital gold\" isn't <just> a meme"
    );
    assert_eq!(strip_html("AT&amp;amp;T &amp;lt;b&amp;gt;"), "AT&amp;T &lt;b&gt;");
  }
}
