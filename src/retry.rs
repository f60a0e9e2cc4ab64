//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Classify, ErrorClass};

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// The outcome of one failed attempt inside a `run` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt<E> {
  /// 1-based
  pub attempt_number: u32,
  pub last_error: E,
}

impl<E: Classify> RetryAttempt<E> {
  /// Whether another attempt is allowed after this one.
  pub fn can_retry(&self, max_attempts: u32) -> bool {
    self.last_error.class() == ErrorClass::Retryable && self.attempt_number < max_attempts
  }
}

/// How many times to try a remote call and how long to wait between tries.
///
/// The delay after attempt `n` is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: DEFAULT_MAX_ATTEMPTS,
      base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
    }
  }
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
    Self {
      max_attempts,
      base_delay,
    }
  }

  /// Delay to wait after the given failed attempt.
  pub fn delay_after(&self, attempt_number: u32) -> Duration {
    self.base_delay * attempt_number
  }

  /// Run `operation` until it succeeds, fails terminally, or runs out of attempts.
  ///
  /// The last error is returned unchanged.
  pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
  where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let max_attempts = self.max_attempts.max(1);
    let mut attempt_number = 1;

    loop {
      let attempt = match operation().await {
        Ok(value) => {
          if attempt_number > 1 {
            debug!(attempt_number, "Remote call succeeded after retry");
          }
          return Ok(value);
        }
        Err(last_error) => RetryAttempt {
          attempt_number,
          last_error,
        },
      };

      if !attempt.can_retry(max_attempts) {
        if attempt.last_error.class() == ErrorClass::Terminal {
          debug!(attempt = attempt_number, error = %attempt.last_error, "Terminal error, not retrying");
        } else {
          warn!(attempts = attempt_number, error = %attempt.last_error, "Retries exhausted");
        }
        return Err(attempt.last_error);
      }

      let delay = self.delay_after(attempt_number);
      warn!(
        attempt = attempt_number,
        max_attempts,
        delay_ms = delay.as_millis() as u64,
        error = %attempt.last_error,
        "Remote call failed, retrying"
      );
      tokio::time::sleep(delay).await;
      attempt_number += 1;
    }
  }
}
