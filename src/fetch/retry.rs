//! Retry with exponential backoff for rate-limited upstream calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::clock::Clock;

/// Responses that can tell whether upstream asked us to slow down.
pub trait RateLimitSignal {
  fn is_rate_limited(&self) -> bool;
}

impl RateLimitSignal for reqwest::Response {
  fn is_rate_limited(&self) -> bool {
    self.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
  }
}

/// How many times to try a request and how long to wait before the first retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total number of attempts, including the first one
  pub max_attempts: u32,
  /// Delay before the first retry; doubled after every retry
  pub initial_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      initial_delay: Duration::from_millis(1000),
    }
  }
}

/// Attempts left and the delay to apply before the next one.
#[derive(Debug)]
struct RetryState {
  attempts_remaining: u32,
  current_delay: Duration,
}

impl RetryState {
  fn new(policy: &RetryPolicy) -> Self {
    Self {
      attempts_remaining: policy.max_attempts.max(1),
      current_delay: policy.initial_delay,
    }
  }

  /// Consume the attempt that just finished.
  ///
  /// Returns how long to wait before trying again, or `None` once exhausted.
  fn next_delay(&mut self) -> Option<Duration> {
    self.attempts_remaining = self.attempts_remaining.saturating_sub(1);
    if self.attempts_remaining == 0 {
      return None;
    }
    let delay = self.current_delay;
    self.current_delay = self.current_delay.saturating_mul(2);
    Some(delay)
  }
}

/// Run `send` until it produces a response that is not rate limited.
///
/// Rate-limited responses and transport errors are retried after
/// `initial_delay`, `2 * initial_delay`, `4 * initial_delay`, ... until
/// `max_attempts` calls have been made. When attempts run out the last
/// outcome is handed back unchanged: a rate-limited response comes back as
/// `Ok` for the caller to classify, a transport error as `Err`. Any other
/// response is returned immediately.
pub async fn fetch_with_retry<R, E, F, Fut>(
  clock: &dyn Clock,
  policy: RetryPolicy,
  mut send: F,
) -> Result<R, E>
where
  R: RateLimitSignal,
  E: Display,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<R, E>>,
{
  let mut state = RetryState::new(&policy);
  let mut attempt = 1u32;

  loop {
    let outcome = send().await;
    let reason = match &outcome {
      Ok(response) if response.is_rate_limited() => "rate limited".to_string(),
      Ok(_) => return outcome,
      Err(e) => e.to_string(),
    };

    let Some(delay) = state.next_delay() else {
      warn!(attempt, %reason, "Giving up after {} attempts", attempt);
      return outcome;
    };

    debug!(
      attempt,
      delay_ms = delay.as_millis() as u64,
      %reason,
      "Retrying request"
    );
    clock.sleep(delay).await;
    attempt += 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::ManualClock;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Debug, PartialEq)]
  struct StubResponse(u16);

  impl RateLimitSignal for StubResponse {
    fn is_rate_limited(&self) -> bool {
      self.0 == 429
    }
  }

  fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
  }

  #[tokio::test]
  async fn test_recovers_after_three_rate_limits() {
    let clock = ManualClock::default();
    let calls = AtomicU32::new(0);

    let result: Result<StubResponse, String> =
      fetch_with_retry(&clock, RetryPolicy::default(), || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok(StubResponse(if n < 3 { 429 } else { 200 })) }
      })
      .await;

    assert_eq!(result, Ok(StubResponse(200)));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(clock.sleeps(), vec![ms(1000), ms(2000), ms(4000)]);
  }

  #[tokio::test]
  async fn test_exhausted_rate_limit_returns_last_response() {
    let clock = ManualClock::default();
    let calls = AtomicU32::new(0);

    let result: Result<StubResponse, String> =
      fetch_with_retry(&clock, RetryPolicy::default(), || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(StubResponse(429)) }
      })
      .await;

    assert_eq!(result, Ok(StubResponse(429)));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(
      clock.sleeps(),
      vec![ms(1000), ms(2000), ms(4000), ms(8000)]
    );
  }

  #[tokio::test]
  async fn test_transport_errors_are_retried_then_returned() {
    let clock = ManualClock::default();
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy {
      max_attempts: 3,
      initial_delay: ms(500),
    };

    let result: Result<StubResponse, String> = fetch_with_retry(&clock, policy, || {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Err("connection reset".to_string()) }
    })
    .await;

    assert_eq!(result, Err("connection reset".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(clock.sleeps(), vec![ms(500), ms(1000)]);
  }

  #[tokio::test]
  async fn test_other_statuses_are_not_retried() {
    let clock = ManualClock::default();
    let calls = AtomicU32::new(0);

    let result: Result<StubResponse, String> =
      fetch_with_retry(&clock, RetryPolicy::default(), || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(StubResponse(500)) }
      })
      .await;

    assert_eq!(result, Ok(StubResponse(500)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(clock.sleeps().is_empty());
  }

  #[tokio::test]
  async fn test_zero_attempts_still_calls_once() {
    let clock = ManualClock::default();
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy {
      max_attempts: 0,
      initial_delay: ms(1000),
    };

    let result: Result<StubResponse, String> = fetch_with_retry(&clock, policy, || {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Ok(StubResponse(429)) }
    })
    .await;

    assert_eq!(result, Ok(StubResponse(429)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
