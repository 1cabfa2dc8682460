//! Attempt budget and backoff between attempts.

use std::time::Duration;

use lockwarden_core::config::RetryConfig;

/// How many attempts an action gets and how long to wait between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Failed attempt number that fires the degraded notification.
    pub degraded_after: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::scheduled(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Budget for schedule-driven actions.
    pub fn scheduled(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            degraded_after: config.degraded_after,
            base_delay: Duration::from_secs(config.base_delay_secs),
            factor: config.backoff_factor.max(1.0),
            max_delay: Duration::from_secs(config.max_delay_secs.max(config.base_delay_secs)),
        }
    }

    /// Budget for bot/CLI requests: same backoff, fewer attempts.
    pub fn manual(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.manual_max_attempts.max(1),
            ..Self::scheduled(config)
        }
    }

    /// Wait after failed attempt `n` (1-based): `min(base * factor^(n-1), max)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// True when failed attempt `n` should fire the degraded notification.
    /// The last attempt escalates to critical instead.
    pub fn is_degraded_threshold(&self, attempt: u32) -> bool {
        attempt == self.degraded_after && attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..10).map(|n| policy.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 300, 300, 300]);
    }

    #[test]
    fn test_delays_never_decrease() {
        let configs = [
            RetryConfig::default(),
            RetryConfig {
                base_delay_secs: 0,
                ..Default::default()
            },
            RetryConfig {
                backoff_factor: 1.0,
                ..Default::default()
            },
            RetryConfig {
                backoff_factor: 1e6,
                max_delay_secs: u64::MAX / 4,
                ..Default::default()
            },
        ];
        for config in configs {
            let policy = RetryPolicy::scheduled(&config);
            for n in 1..200 {
                assert!(
                    policy.delay_after(n + 1) >= policy.delay_after(n),
                    "{config:?} attempt {n}"
                );
            }
        }
    }

    #[test]
    fn test_manual_policy() {
        let policy = RetryPolicy::manual(&RetryConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert!(!(1..=3).any(|n| policy.is_degraded_threshold(n)));
    }

    #[test]
    fn test_degraded_threshold() {
        let policy = RetryPolicy::default();
        assert!(policy.is_degraded_threshold(5));
        assert!(!policy.is_degraded_threshold(4));
        assert!(!policy.is_degraded_threshold(10));

        let tight = RetryPolicy {
            max_attempts: 5,
            ..RetryPolicy::default()
        };
        assert!(!tight.is_degraded_threshold(5));
    }
}
