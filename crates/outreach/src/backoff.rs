use std::time::Duration;

use rand::Rng;

/// Retry timing for transient delivery failures.
///
/// The n-th failed attempt (1-based) waits `base * 2^(n-1)` plus a uniform
/// jitter in `[0, jitter]`, never more than `cap`. Jitter keeps many items
/// that failed together from retrying together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retryable failures before an item is dead-lettered.
    pub ceiling: u32,
    pub base: Duration,
    pub cap: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            ceiling: 5,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(600),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Whether an item that has now failed `attempt_count` times may be
    /// scheduled again.
    pub fn allows_retry(&self, attempt_count: u32) -> bool {
        attempt_count <= self.ceiling
    }

    /// Delay before the next attempt after the `attempt_count`-th failure.
    pub fn delay<R: Rng>(&self, attempt_count: u32, rng: &mut R) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(31);
        let exponential = self.base.saturating_mul(1u32 << exponent);

        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..=jitter_ms))
        };

        exponential.saturating_add(jitter).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            ceiling: 5,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(60),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = no_jitter();
        let mut rng = StdRng::seed_from_u64(1);
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.delay(n, &mut rng).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32]);
    }

    #[test]
    fn delay_is_capped() {
        let policy = no_jitter();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.delay(6, &mut rng), Duration::from_secs(60));
        assert_eq!(policy.delay(40, &mut rng), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: Duration::from_millis(500),
            ..no_jitter()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let d = policy.delay(1, &mut rng);
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_millis(2500));
        }
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let policy = RetryPolicy {
            jitter: Duration::from_secs(30),
            ..no_jitter()
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            assert!(policy.delay(5, &mut rng) <= Duration::from_secs(60));
        }
    }

    #[test]
    fn ceiling_is_inclusive() {
        let policy = no_jitter();
        assert!(policy.allows_retry(5));
        assert!(!policy.allows_retry(6));
    }
}
