use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single upstream read, after any retries.
///
/// Cloneable so a single in-flight fetch can hand the same failure to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// Upstream kept answering 429 until retries ran out
  #[error("Rate limit exceeded. Please try again later.")]
  RateLimited,
  /// Connection, DNS or body read failure
  #[error("Network request failed: {0}")]
  TransportFailure(String),
  /// Any other non-success status
  #[error("Upstream returned HTTP {status}")]
  UpstreamError { status: u16 },
  /// Body did not match the expected JSON shape
  #[error("Failed to parse response: {0}")]
  MalformedResponse(String),
  /// The queue worker is gone, so nothing can be scheduled
  #[error("Request queue is closed")]
  QueueClosed,
}

impl FetchError {
  /// Classify a final response status. Returns `None` for success statuses.
  pub fn from_status(status: StatusCode) -> Option<Self> {
    if status.is_success() {
      None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
      Some(Self::RateLimited)
    } else {
      Some(Self::UpstreamError {
        status: status.as_u16(),
      })
    }
  }

  /// Message suitable for showing to a user.
  pub fn user_message(&self) -> String {
    match self {
      Self::RateLimited => self.to_string(),
      Self::UpstreamError { status } => format!("Failed to fetch data (HTTP {})", status),
      Self::TransportFailure(_) => {
        "Failed to reach the market data service. Check your connection.".to_string()
      }
      Self::MalformedResponse(_) | Self::QueueClosed => {
        "Failed to fetch data. Please try again later.".to_string()
      }
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    Self::TransportFailure(err.to_string())
  }
}
