//! Retry policy and backoff for downloads.

use std::time::Duration;

/// Exponential backoff for retryable network failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
  /// Retries after the first attempt. Zero disables retrying.
  pub max_retries: u32,
  pub initial_delay: Duration,
  pub backoff_multiplier: f64,
  pub max_delay: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_delay: Duration::from_millis(500),
      backoff_multiplier: 2.0,
      max_delay: Duration::from_secs(30),
    }
  }
}

impl RetryConfig {
  /// No retries; the first failure is final.
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      ..Self::default()
    }
  }

  /// Delay before retry number `attempt` (1-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
    let capped = delay.min(self.max_delay.as_secs_f64()).max(0.0);
    Duration::from_secs_f64(capped)
  }
}
