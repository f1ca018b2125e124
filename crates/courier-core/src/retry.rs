use std::time::Duration;

/// How the dispatcher treats an event whose delivery keeps failing.
///
/// Events are dispatched strictly in order, so a failing head event holds
/// back everything behind it. Backoff spaces out the retries; `max_attempts`
/// bounds them by dead-lettering the event.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure. Zero retries on the next tick.
    pub backoff_base: Duration,
    /// Upper bound for the exponential delay.
    pub backoff_max: Duration,
    /// Dead-letter the event once this many attempts have failed. `None`
    /// retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_base: Duration::ZERO,
            backoff_max: Duration::from_secs(300),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Retry on every tick, never give up.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Wait before the next attempt after `attempts` failures.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if attempts == 0 || self.backoff_base.is_zero() {
            return Duration::ZERO;
        }

        let exponent = (attempts - 1).min(31);
        self.backoff_base
            .checked_mul(1u32 << exponent)
            .map_or(self.backoff_max, |delay| delay.min(self.backoff_max))
    }

    /// True once `attempts` failures mean the event should be dead-lettered.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_never_backs_off_or_gives_up() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(50), Duration::ZERO);
        assert!(!policy.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_delay_doubles_until_capped() {
        let policy = RetryPolicy::unbounded()
            .with_backoff(Duration::from_secs(1), Duration::from_secs(10));

        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(200), Duration::from_secs(10));
    }

    #[test]
    fn test_exhausted_at_max_attempts() {
        let policy = RetryPolicy::unbounded().with_max_attempts(3);

        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }
}
