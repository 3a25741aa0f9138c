//! Cache layer that orchestrates caching logic with queued network fetching.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::fetch::{Clock, FetchError, RequestQueue};

use super::entry::{read_entry, write_entry, CacheEntry};
use super::storage::KeyValueStore;
use super::traits::{CacheKey, CacheResult};

/// A queued fetch that several callers can await at once.
type SharedFetch = Shared<BoxFuture<'static, Result<Value, FetchError>>>;

/// Cache layer that manages caching logic and network fetching.
///
/// Reads are served from the store while younger than their TTL. Misses are
/// pushed through the shared request queue, so no matter how many callers
/// miss at once only one upstream call is in flight.
pub struct CacheLayer<S: KeyValueStore + ?Sized> {
  storage: Arc<S>,
  queue: RequestQueue,
  clock: Arc<dyn Clock>,
  /// Fetches currently queued or running, by cache key
  in_flight: Arc<Mutex<HashMap<String, SharedFetch>>>,
  dedupe_in_flight: bool,
}

impl<S: KeyValueStore + ?Sized + 'static> CacheLayer<S> {
  /// Create a new cache layer over the given storage backend.
  pub fn new(storage: Arc<S>, queue: RequestQueue, clock: Arc<dyn Clock>) -> Self {
    Self {
      storage,
      queue,
      clock,
      in_flight: Arc::default(),
      dedupe_in_flight: true,
    }
  }

  /// Whether concurrent misses for the same key share one fetch.
  ///
  /// When disabled every miss enqueues its own producer call.
  pub fn with_dedupe(mut self, dedupe_in_flight: bool) -> Self {
    self.dedupe_in_flight = dedupe_in_flight;
    self
  }

  /// Fetch a resource addressed by a typed key.
  pub async fn fetch<K, T, F, Fut>(
    &self,
    key: &K,
    ttl: Duration,
    producer: F,
  ) -> Result<CacheResult<T>, FetchError>
  where
    K: CacheKey,
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    debug!(resource = %key.description(), "Fetching");
    self.get_or_fetch(&key.cache_key(), ttl, producer).await
  }

  /// Return the cached value for `key` if younger than `ttl`, otherwise queue
  /// `producer` and cache what it returns.
  ///
  /// A fresh hit never touches the queue. If the producer fails, whatever was
  /// stored before (stale or not) is left as is and the error is returned.
  pub async fn get_or_fetch<T, F, Fut>(
    &self,
    key: &str,
    ttl: Duration,
    producer: F,
  ) -> Result<CacheResult<T>, FetchError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    if let Some(hit) = self.read_fresh(key, ttl) {
      return Ok(hit);
    }

    let value = if self.dedupe_in_flight {
      self.join_or_start(key, producer).await?
    } else {
      self.start(key, producer, None).await?
    };

    let data = serde_json::from_value(value)
      .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;
    Ok(CacheResult::from_network(data))
  }

  /// Remove every cached entry.
  pub fn clear(&self) -> color_eyre::Result<usize> {
    self.storage.clear()
  }

  /// Look up a fresh entry. Store failures and undecodable payloads count as misses.
  fn read_fresh<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<CacheResult<T>> {
    let entry = match read_entry(self.storage.as_ref(), key) {
      Ok(Some(entry)) => entry,
      Ok(None) => {
        debug!(key, "Cache miss");
        return None;
      }
      Err(e) => {
        warn!(key, error = %e, "Cache read failed, treating as miss");
        return None;
      }
    };

    let now = self.clock.now_millis();
    if !entry.is_fresh(now, ttl_millis(ttl)) {
      debug!(key, age_ms = ?entry.age_millis(now), "Cache entry stale");
      return None;
    }

    match serde_json::from_str(&entry.payload) {
      Ok(data) => {
        debug!(key, "Cache hit");
        Some(CacheResult::from_cache(data, entry.stored_at()))
      }
      Err(e) => {
        warn!(key, error = %e, "Cached payload unreadable, treating as miss");
        None
      }
    }
  }

  /// Await the fetch already in flight for `key`, or start one.
  ///
  /// The registration is released by the queued task itself, so a fetch
  /// whose callers all went away is never handed to a later miss.
  fn join_or_start<T, F, Fut>(&self, key: &str, producer: F) -> SharedFetch
  where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = in_flight.get(key) {
      debug!(key, "Joining in-flight fetch");
      return existing.clone();
    }

    // The guard blocks on this lock, so it cannot release before the insert below
    let registration = InFlightRegistration {
      registry: Arc::clone(&self.in_flight),
      key: key.to_string(),
    };
    let shared = self.start(key, producer, Some(registration)).shared();

    in_flight.insert(key.to_string(), shared.clone());
    shared
  }

  /// Enqueue one producer call that writes its result to the store.
  fn start<T, F, Fut>(
    &self,
    key: &str,
    producer: F,
    registration: Option<InFlightRegistration>,
  ) -> BoxFuture<'static, Result<Value, FetchError>>
  where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let storage = Arc::clone(&self.storage);
    let clock = Arc::clone(&self.clock);
    let key = key.to_string();

    debug!(key = %key, pending = self.queue.pending(), "Queueing fetch");
    let queued = self.queue.submit(async move {
      // Dropped when this task ends, however it ends
      let _registration = registration;

      let data = producer().await?;
      let value =
        serde_json::to_value(&data).map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

      let entry = CacheEntry {
        key,
        payload: value.to_string(),
        stored_at_millis: clock.now_millis(),
      };
      if let Err(e) = write_entry(storage.as_ref(), &entry) {
        warn!(key = %entry.key, error = %e, "Failed to write cache entry");
      }

      Ok::<_, FetchError>(value)
    });

    Box::pin(async move { queued.await? })
  }
}

/// TTL in milliseconds, saturating for durations too long to represent.
fn ttl_millis(ttl: Duration) -> i64 {
  i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Holds a key in the in-flight map until the queued task that owns it is dropped.
struct InFlightRegistration {
  registry: Arc<Mutex<HashMap<String, SharedFetch>>>,
  key: String,
}

impl Drop for InFlightRegistration {
  fn drop(&mut self) {
    let removed = self
      .registry
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.key);
    // Dropped only after the lock is released
    drop(removed);
  }
}

impl<S: KeyValueStore + ?Sized> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      queue: self.queue.clone(),
      clock: Arc::clone(&self.clock),
      in_flight: Arc::clone(&self.in_flight),
      dedupe_in_flight: self.dedupe_in_flight,
    }
  }
}
