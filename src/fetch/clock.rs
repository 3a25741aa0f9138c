//! Time source and delay function shared by the queue, retry and cache code.

use futures::future::BoxFuture;
use std::time::Duration;

/// Source of "now" and of suspensions.
pub trait Clock: Send + Sync {
  /// Current time in milliseconds since the Unix epoch.
  fn now_millis(&self) -> i64;

  /// Suspend the calling task for `duration`.
  fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall clock backed by chrono and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_millis(&self) -> i64 {
    chrono::Utc::now().timestamp_millis()
  }

  fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
    Box::pin(tokio::time::sleep(duration))
  }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
  use super::Clock;
  use futures::future::BoxFuture;
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  #[derive(Debug, Default)]
  struct ManualState {
    now: i64,
    sleeps: Vec<Duration>,
  }

  /// Clock whose sleeps complete instantly by advancing virtual time.
  ///
  /// Every requested sleep is recorded so tests can assert on delays.
  #[derive(Debug, Clone, Default)]
  pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
  }

  impl ManualClock {
    pub fn starting_at(now_millis: i64) -> Self {
      Self {
        state: Arc::new(Mutex::new(ManualState {
          now: now_millis,
          sleeps: Vec::new(),
        })),
      }
    }

    pub fn advance(&self, duration: Duration) {
      self.state.lock().unwrap().now += duration.as_millis() as i64;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
      self.state.lock().unwrap().sleeps.clone()
    }
  }

  impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
      self.state.lock().unwrap().now
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
      {
        let mut state = self.state.lock().unwrap();
        state.now += duration.as_millis() as i64;
        state.sleeps.push(duration);
      }
      // Still yield so other tasks get a turn, like a real timer would.
      Box::pin(tokio::task::yield_now())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_manual_clock_sleep_advances_time() {
    let clock = ManualClock::starting_at(1_000);
    clock.sleep(Duration::from_millis(250)).await;
    clock.advance(Duration::from_millis(50));

    assert_eq!(clock.now_millis(), 1_300);
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
  }

  #[test]
  fn test_system_clock_is_after_2020() {
    assert!(SystemClock.now_millis() > 1_577_836_800_000);
  }
}
