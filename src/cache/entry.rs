//! Cache entries as laid out in the key-value store.
//!
//! One entry occupies two store keys: `{key}` holds the JSON payload and
//! `{key}_timestamp` holds the epoch milliseconds it was stored at.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};

use super::storage::KeyValueStore;

/// A payload and the time it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub key: String,
  pub payload: String,
  pub stored_at_millis: i64,
}

impl CacheEntry {
  /// Milliseconds since the entry was stored, or `None` if a corrupt
  /// timestamp puts that out of range.
  pub fn age_millis(&self, now_millis: i64) -> Option<i64> {
    now_millis.checked_sub(self.stored_at_millis)
  }

  /// Whether the entry is still valid at `now_millis` for the given TTL.
  /// An out-of-range age is never fresh.
  pub fn is_fresh(&self, now_millis: i64, ttl_millis: i64) -> bool {
    self
      .age_millis(now_millis)
      .is_some_and(|age| age < ttl_millis)
  }

  pub fn stored_at(&self) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(self.stored_at_millis).unwrap_or_default()
  }
}

pub fn timestamp_key(key: &str) -> String {
  format!("{}_timestamp", key)
}

/// Read both halves of an entry. Missing either half means no entry.
pub fn read_entry<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Result<Option<CacheEntry>> {
  let Some(payload) = store.get(key)? else {
    return Ok(None);
  };
  let Some(stamp) = store.get(&timestamp_key(key))? else {
    return Ok(None);
  };

  let stored_at_millis = stamp
    .trim()
    .parse::<i64>()
    .map_err(|e| eyre!("Invalid timestamp '{}' for cache key {}: {}", stamp, key, e))?;

  Ok(Some(CacheEntry {
    key: key.to_string(),
    payload,
    stored_at_millis,
  }))
}

/// Write payload and timestamp together.
pub fn write_entry<S: KeyValueStore + ?Sized>(store: &S, entry: &CacheEntry) -> Result<()> {
  let stamp_key = timestamp_key(&entry.key);
  let stamp = entry.stored_at_millis.to_string();
  store.set_many(&[
    (entry.key.as_str(), entry.payload.as_str()),
    (stamp_key.as_str(), stamp.as_str()),
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;

  #[test]
  fn test_write_then_read_uses_two_keys() {
    let store = MemoryStore::new();
    let entry = CacheEntry {
      key: "cryptoDetail_bitcoin".to_string(),
      payload: r#"{"id":"bitcoin"}"#.to_string(),
      stored_at_millis: 1_700_000_000_000,
    };
    write_entry(&store, &entry).unwrap();

    assert_eq!(
      store
        .get("cryptoDetail_bitcoin_timestamp")
        .unwrap()
        .as_deref(),
      Some("1700000000000")
    );
    assert_eq!(read_entry(&store, "cryptoDetail_bitcoin").unwrap(), Some(entry));
  }

  #[test]
  fn test_payload_without_timestamp_is_no_entry() {
    let store = MemoryStore::new();
    store.set("k", "{}").unwrap();
    assert_eq!(read_entry(&store, "k").unwrap(), None);
  }

  #[test]
  fn test_garbled_timestamp_is_an_error() {
    let store = MemoryStore::new();
    store.set("k", "{}").unwrap();
    store.set("k_timestamp", "yesterday").unwrap();
    assert!(read_entry(&store, "k").is_err());
  }

  #[test]
  fn test_freshness_boundary() {
    let entry = CacheEntry {
      key: "k".to_string(),
      payload: String::new(),
      stored_at_millis: 1_000,
    };
    assert!(entry.is_fresh(1_999, 1_000));
    assert!(!entry.is_fresh(2_000, 1_000));
  }

  #[test]
  fn test_extreme_timestamp_is_never_fresh() {
    let entry = CacheEntry {
      key: "k".to_string(),
      payload: String::new(),
      stored_at_millis: i64::MIN,
    };
    assert_eq!(entry.age_millis(1_000_000), None);
    assert!(!entry.is_fresh(1_000_000, 300_000));
    assert!(!entry.is_fresh(1_000_000, i64::MAX));
  }
}
