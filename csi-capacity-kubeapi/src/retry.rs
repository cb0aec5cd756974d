use std::time::Duration;

use time::ext::NumericalStdDuration as _;

/// Bounded optimistic-concurrency retry: a small attempt budget with
/// exponentially growing delays, so concurrent writers converge without
/// hammering the apiserver.
///
/// The whole policy is a plain value so tests can shrink the budget and
/// zero the delays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: 10.std_milliseconds(),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given 1-based attempt has failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(self.multiplier.saturating_pow(exp))
    }
}
