use std::time::Duration;

/// Bounded exponential backoff: `delay(n) = min(base * 2^n, max_delay)`
/// for retry `n` (0-based), at most `max_retries` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self { base, max_delay, max_retries }
    }

    /// Delay before retry `attempt` (0 = first retry).
    pub fn delay(&self, attempt: u32) -> Duration {
        let Some(factor) = 1u32.checked_shl(attempt) else {
            return self.max_delay;
        };
        match self.base.checked_mul(factor) {
            Some(d) => d.min(self.max_delay),
            None => self.max_delay,
        }
    }

    /// Every delay the policy will ever produce, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(move |attempt| self.delay(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(1000), 6);
        let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn huge_attempts_saturate() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), u32::MAX);
        assert_eq!(policy.delay(31), Duration::from_secs(30));
        assert_eq!(policy.delay(32), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn zero_retries_yields_nothing() {
        let policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(10), 0);
        assert_eq!(policy.delays().count(), 0);
    }
}
