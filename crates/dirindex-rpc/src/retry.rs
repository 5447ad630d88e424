//! Bounded fixed-delay retry policy for pull calls.

use std::time::Duration;

/// Retry configuration for transient pull-call failures.
///
/// Deliberately fixed-delay rather than exponential: historical replay polls
/// a node we expect to be healthy, and the bound matters more than backoff
/// shape. Exhausting the bound surfaces the error to the caller.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Returns the delay before the `attempt`-th retry (1-based), or `None`
    /// once `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt <= self.max_retries).then_some(self.delay)
    }
}
