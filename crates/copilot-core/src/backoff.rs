//! Bounded exponential backoff with jitter.
//!
//! Shared by the watch reconnect loop and the reconcile requeue path.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy: bounded attempts, exponential delay growth, equal jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Ceiling on any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based), jittered.
    ///
    /// Grows as base * 2^(attempt-1), capped at `max_delay_ms`. Half of the
    /// delay is fixed and the other half uniformly random, so a burst of
    /// failures does not retry in lockstep.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        let half = raw / 2;
        Duration::from_millis(half + fastrand::u64(0..=half.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, 1_000);
        assert_eq!(policy.max_delay_ms, 30_000);
    }

    #[test]
    fn test_allows_up_to_max_attempts() {
        let policy = RetryPolicy::new(3, 100, 1_000);
        assert!(policy.allows(0));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
        assert!(!policy.allows(4));
    }

    #[test]
    fn test_zero_attempt_has_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy::new(10, 100, 800);
        for attempt in 1..=10 {
            let raw = 100u64
                .saturating_mul(1 << (attempt - 1).min(16))
                .min(800);
            let delay = policy.delay_for(attempt);
            // Equal jitter: delay lands in [raw/2, raw] (plus the 1ms floor).
            assert!(delay >= Duration::from_millis(raw / 2));
            assert!(delay <= Duration::from_millis(raw + 1));
        }
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = RetryPolicy::new(u32::MAX, u64::MAX / 2, u64::MAX);
        let _ = policy.delay_for(u32::MAX);
    }
}
