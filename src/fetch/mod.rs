//! Rate-limit aware request plumbing.
//!
//! Everything that talks to the upstream API goes through this module:
//! - `RequestQueue` serializes requests into a single lane with a fixed
//!   cool-down between them
//! - `fetch_with_retry` retries rate-limited and failed requests with
//!   exponential backoff
//! - `Clock` abstracts time so both can be driven deterministically in tests

mod clock;
mod error;
mod queue;
mod retry;

pub use clock::{Clock, SystemClock};
pub use error::FetchError;
pub use queue::RequestQueue;
pub use retry::{fetch_with_retry, RetryPolicy};

#[cfg(test)]
pub use clock::ManualClock;
