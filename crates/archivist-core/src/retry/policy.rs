use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::AutomationError;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wait timed out (navigation, download start).
    Timeout,
    /// The page did not move.
    Stalled,
    /// Anything else; not retried.
    Other,
}

impl ErrorKind {
    pub fn of(e: &AutomationError) -> Self {
        match e {
            AutomationError::Timeout(_) => ErrorKind::Timeout,
            AutomationError::Stalled(_) => ErrorKind::Stalled,
            AutomationError::Driver(_) | AutomationError::Locator(_) => ErrorKind::Other,
        }
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Fixed-backoff policy: up to `max_retries` retries after the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            backoff: Duration::from_secs_f64(cfg.backoff_secs.max(0.0)),
        }
    }
}

impl RetryPolicy {
    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// `attempt` is 1-based (1 = first attempt, which just failed).
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts() {
            return RetryDecision::NoRetry;
        }
        match kind {
            ErrorKind::Other => RetryDecision::NoRetry,
            ErrorKind::Timeout | ErrorKind::Stalled => RetryDecision::RetryAfter(self.backoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_retry_for_other() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorKind::Other), RetryDecision::NoRetry);
    }

    #[test]
    fn backoff_is_fixed() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.decide(1, ErrorKind::Timeout),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            p.decide(3, ErrorKind::Stalled),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
    }

    #[test]
    fn three_retries_then_stop() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts(), 4);
        assert!(matches!(p.decide(3, ErrorKind::Timeout), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(4, ErrorKind::Timeout), RetryDecision::NoRetry);
    }

    #[test]
    fn from_config() {
        let cfg = RetryConfig {
            max_retries: 1,
            backoff_secs: 0.25,
        };
        let p = RetryPolicy::from(&cfg);
        assert_eq!(p.max_attempts(), 2);
        assert_eq!(p.backoff, Duration::from_millis(250));
    }
}
