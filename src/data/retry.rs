//! Bounded retry with exponential backoff.
//!
//! The upstream API gives no delivery guarantees, so every request goes
//! through [`with_retry`]. Only transient failures are retried; a rejected
//! token or a bad location id fails on the first attempt.

use std::time::Duration;

use log::warn;

/// Retry budget for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Backoff before retry number `retry` (1-based), doubling and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Outcome of a single attempt that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Worth trying again (transport error, 429, 5xx).
    Transient(String),
    /// Retrying will not help (other 4xx, undecodable body).
    Fatal(String),
}

/// Run `op` until it succeeds, fails fatally, or the budget is spent.
///
/// Returns the last failure message on error.
pub fn with_retry<T>(policy: &RetryPolicy, what: &str, mut op: impl FnMut() -> Result<T, Attempt>) -> Result<T, String> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(Attempt::Fatal(message)) => return Err(message),
            Err(Attempt::Transient(message)) => {
                if attempt >= attempts {
                    return Err(format!("{message} (gave up after {attempts} attempts)"));
                }
                let wait = policy.backoff(attempt);
                warn!("{what}: attempt {attempt}/{attempts} failed: {message}; retrying in {wait:?}");
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(10), Duration::from_secs(8));
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let mut calls = 0;
        let out = with_retry(&instant_policy(3), "test", || {
            calls += 1;
            if calls < 3 {
                Err(Attempt::Transient("503".to_string()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(out, Ok(3));
    }

    #[test]
    fn fatal_failures_are_not_retried() {
        let mut calls = 0;
        let out: Result<(), String> = with_retry(&instant_policy(5), "test", || {
            calls += 1;
            Err(Attempt::Fatal("401".to_string()))
        });
        assert_eq!(calls, 1);
        assert_eq!(out, Err("401".to_string()));
    }

    #[test]
    fn budget_is_finite() {
        let mut calls = 0;
        let out: Result<(), String> = with_retry(&instant_policy(2), "test", || {
            calls += 1;
            Err(Attempt::Transient("timeout".to_string()))
        });
        assert_eq!(calls, 2);
        assert!(out.unwrap_err().contains("gave up after 2 attempts"));
    }
}
