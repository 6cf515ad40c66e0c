//! Exponential backoff with jitter for GitHub API calls

use crate::config::schema::ResolverConfig;
use rand::Rng;
use std::time::Duration;

/// Retry schedule for transient API failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial: Duration::from_millis(config.initial_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// `floor` is a server-provided wait (Retry-After, rate-limit reset); it
    /// raises the delay but never past `max`.
    pub fn delay(&self, attempt: u32, floor: Option<Duration>) -> Duration {
        let spread = self.spread_ms(attempt);
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        self.delay_with(attempt, floor, jitter)
    }

    fn base(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial.saturating_mul(1 << exp).min(self.max)
    }

    /// Width of the random half of the delay
    fn spread_ms(&self, attempt: u32) -> u64 {
        (self.base(attempt) / 2).as_millis() as u64
    }

    /// Equal jitter: half the base is fixed, `jitter_ms` (clamped to the
    /// spread) is added on top
    fn delay_with(&self, attempt: u32, floor: Option<Duration>, jitter_ms: u64) -> Duration {
        let half = self.base(attempt) / 2;
        let jittered = half + Duration::from_millis(jitter_ms.min(self.spread_ms(attempt)));

        match floor {
            Some(floor) => jittered.max(floor.min(self.max)),
            None => jittered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial: Duration::from_millis(100),
            max: Duration::from_millis(1000),
        }
    }

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let p = policy();
        for (attempt, base) in [(1, 100), (2, 200), (3, 400), (4, 800)] {
            let low = p.delay_with(attempt, None, 0);
            let high = p.delay_with(attempt, None, u64::MAX);
            assert_eq!(low, Duration::from_millis(base / 2));
            assert!(high <= Duration::from_millis(base));
            assert!(high >= low);
        }
    }

    #[test]
    fn delay_is_capped() {
        let p = policy();
        assert!(p.delay_with(30, None, u64::MAX) <= p.max);
    }

    #[test]
    fn floor_raises_delay_up_to_max() {
        let p = policy();
        assert_eq!(
            p.delay_with(1, Some(Duration::from_millis(700)), 0),
            Duration::from_millis(700)
        );
        assert_eq!(
            p.delay_with(1, Some(Duration::from_secs(3600)), 0),
            p.max
        );
    }

    #[test]
    fn random_delay_stays_in_band() {
        let p = policy();
        for _ in 0..50 {
            let d = p.delay(2, None);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(200));
        }
    }

    #[test]
    fn zero_attempts_config_still_tries_once() {
        let config = ResolverConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }
}
