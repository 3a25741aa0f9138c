//! Human readable money and percentage formatting for terminal output.

/// USD price with precision depending on magnitude.
///
/// `$1,234.56` at or above one dollar, four decimals down to a cent, and
/// between two and six significant digits below that.
pub fn format_price(price: f64) -> String {
  if !price.is_finite() {
    return "-".to_string();
  }
  let abs = price.abs();
  let body = if abs >= 1.0 {
    with_thousands(abs, 2)
  } else if abs >= 0.01 {
    format!("{:.4}", abs)
  } else {
    significant(abs, 2, 6)
  };
  format!("{}${}", if price < 0.0 { "-" } else { "" }, body)
}

/// Like `format_price`, but millions collapse to `$1.23M` for table columns.
pub fn format_compact_price(price: f64) -> String {
  if price.is_finite() && price >= 1e6 {
    format!("${:.2}M", price / 1e6)
  } else {
    format_price(price)
  }
}

/// Volume or market cap as `$1.23B`, `$4.56M` or `$789.00`.
pub fn format_volume(volume: f64) -> String {
  if !volume.is_finite() {
    "-".to_string()
  } else if volume >= 1e9 {
    format!("${:.2}B", volume / 1e9)
  } else if volume >= 1e6 {
    format!("${:.2}M", volume / 1e6)
  } else {
    format!("${:.2}", volume)
  }
}

/// Signed percentage with two decimals, e.g. `+1.25%`.
pub fn format_percent(percent: f64) -> String {
  if percent.is_finite() {
    format!("{:+.2}%", percent)
  } else {
    "-".to_string()
  }
}

/// Plain number with thousands separators and no decimals, for supplies.
pub fn format_amount(amount: f64) -> String {
  if amount.is_finite() {
    let body = with_thousands(amount.abs(), 0);
    if amount < 0.0 {
      format!("-{}", body)
    } else {
      body
    }
  } else {
    "-".to_string()
  }
}

fn with_thousands(value: f64, decimals: usize) -> String {
  let formatted = format!("{:.*}", decimals, value);
  let (int_part, frac_part) = match formatted.split_once('.') {
    Some((i, f)) => (i, Some(f)),
    None => (formatted.as_str(), None),
  };

  let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
  for (i, ch) in int_part.chars().enumerate() {
    if i > 0 && (int_part.len() - i) % 3 == 0 {
      grouped.push(',');
    }
    grouped.push(ch);
  }

  match frac_part {
    Some(f) => format!("{}.{}", grouped, f),
    None => grouped,
  }
}

/// Positive `value` below one, rounded to `max` significant digits with
/// trailing zeros trimmed down to `min` significant digits.
fn significant(value: f64, min: i32, max: i32) -> String {
  if value == 0.0 {
    return "0.00".to_string();
  }
  let exponent = value.log10().floor() as i32;
  let max_decimals = (max - 1 - exponent).max(0) as usize;
  let min_decimals = (min - 1 - exponent).max(0) as usize;

  let mut formatted = format!("{:.*}", max_decimals, value);
  let keep = formatted.find('.').map_or(formatted.len(), |dot| dot + 1 + min_decimals);
  while formatted.len() > keep && formatted.ends_with('0') {
    formatted.pop();
  }
  formatted
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_price_above_one_dollar() {
    assert_eq!(format_price(1234.5), "$1,234.50");
    assert_eq!(format_price(43_210_987.126), "$43,210,987.13");
    assert_eq!(format_price(1.0), "$1.00");
  }

  #[test]
  fn test_price_in_cents() {
    assert_eq!(format_price(0.5), "$0.5000");
    assert_eq!(format_price(0.01234), "$0.0123");
  }

  #[test]
  fn test_price_below_a_cent() {
    assert_eq!(format_price(0.0000123456789), "$0.0000123457");
    assert_eq!(format_price(0.00002), "$0.000020");
  }

  #[test]
  fn test_negative_and_invalid_price() {
    assert_eq!(format_price(-12.5), "-$12.50");
    assert_eq!(format_price(f64::NAN), "-");
  }

  #[test]
  fn test_compact_price() {
    assert_eq!(format_compact_price(2_500_000.0), "$2.50M");
    assert_eq!(format_compact_price(999.0), "$999.00");
  }

  #[test]
  fn test_volume() {
    assert_eq!(format_volume(3.2e9), "$3.20B");
    assert_eq!(format_volume(1.5e6), "$1.50M");
    assert_eq!(format_volume(999.0), "$999.00");
  }

  #[test]
  fn test_percent() {
    assert_eq!(format_percent(1.254), "+1.25%");
    assert_eq!(format_percent(-0.5), "-0.50%");
  }

  #[test]
  fn test_amount() {
    assert_eq!(format_amount(19_600_000.4), "19,600,000");
    assert_eq!(format_amount(42.0), "42");
  }
}
