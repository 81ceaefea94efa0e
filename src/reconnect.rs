//! Bounded reconnection policy.

use std::time::Duration;

/// Default number of reconnection attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default ceiling for the backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Default time allowed for a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// How the client retries after a failed connect or a dropped connection.
///
/// Attempts are numbered from 1. Attempt `n` waits
/// `base_delay * 2^(n-1)`, capped at `max_delay`. The initial connection is
/// not an attempt and never waits.
///
/// ```
/// use std::time::Duration;
/// use tictac_cube_client::ReconnectPolicy;
///
/// let policy = ReconnectPolicy::default();
/// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for(3), Duration::from_secs(4));
/// assert_eq!(policy.delay_for(4), Duration::from_secs(5));
/// assert!(policy.allows(10));
/// assert!(!policy.allows(11));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Whether attempt number `attempt` may be made.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Wait before attempt number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(5000));
        assert_eq!(policy.connect_timeout, Duration::from_millis(20_000));
    }

    #[test]
    fn delay_doubles_then_caps() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (1..=6).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, [1000, 2000, 4000, 5000, 5000, 5000]);
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(40), DEFAULT_MAX_DELAY);
        assert_eq!(policy.delay_for(u32::MAX), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn attempt_zero_never_waits() {
        assert_eq!(ReconnectPolicy::default().delay_for(0), Duration::ZERO);
    }

    #[test]
    fn allows_is_bounded() {
        let policy = ReconnectPolicy::new().with_max_attempts(3);
        assert!(!policy.allows(0));
        assert!(policy.allows(1));
        assert!(policy.allows(3));
        assert!(!policy.allows(4));
        assert!(!ReconnectPolicy::disabled().allows(1));
    }

    #[test]
    fn builders_override_fields() {
        let policy = ReconnectPolicy::new()
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(15))
            .with_connect_timeout(Duration::from_millis(50));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(15));
        assert_eq!(policy.connect_timeout, Duration::from_millis(50));
    }
}
