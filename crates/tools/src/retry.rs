use crate::error::ToolError;
use std::time::Duration;

/// Decides whether a failed attempt is tried again and how long to wait first.
pub trait RetryStrategy: Send + Sync {
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn should_retry(&self, err: &ToolError, attempt: u32, max_attempts: u32) -> bool {
        err.is_retryable() && attempt < max_attempts
    }

    fn delay(&self, attempt: u32) -> Duration;
}

/// `base * 2^(attempt - 1)`, capped.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_millis(5000))
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.delay(1), Duration::from_millis(250));
        assert_eq!(backoff.delay(2), Duration::from_millis(500));
        assert_eq!(backoff.delay(3), Duration::from_millis(1000));
        assert_eq!(backoff.delay(10), Duration::from_millis(5000));
        assert_eq!(backoff.delay(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_only_transient_errors_retry() {
        let backoff = ExponentialBackoff::default();
        let timeout = ToolError::Timeout(Duration::from_secs(1));
        let invalid = ToolError::Validation("missing path".into());
        assert!(backoff.should_retry(&timeout, 1, 3));
        assert!(!backoff.should_retry(&timeout, 3, 3));
        assert!(!backoff.should_retry(&invalid, 1, 3));
    }
}
