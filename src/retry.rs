//! Capped exponential backoff for transient poll failures.
//!
//! The delay starts at `base` on the first failure and doubles on each
//! consecutive failure until it reaches `max`. Any successful poll resets
//! the state to baseline. No jitter is applied: a single poller talks to
//! the API, so there is no herd to spread out, and delays stay monotonic.

use std::time::Duration;

/// Backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
        }
    }
}

/// Consecutive-failure counter and the delay it implies.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: BackoffPolicy,
    failures: u32,
    delay: Duration,
}

impl RetryState {
    /// Baseline state: no failures recorded.
    pub fn new(policy: BackoffPolicy) -> Self {
        RetryState {
            policy,
            failures: 0,
            delay: Duration::ZERO,
        }
    }

    /// Records one more consecutive failure and returns the delay to wait
    /// before the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.delay = if self.failures == 1 {
            self.policy.base.min(self.policy.max)
        } else {
            self.delay
                .saturating_mul(2)
                .max(self.policy.base)
                .min(self.policy.max)
        };
        self.delay
    }

    /// Back to baseline after a successful poll.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.delay = Duration::ZERO;
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay returned by the last [`RetryState::record_failure`], zero at
    /// baseline.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn delays_double_from_base() {
        let mut state = RetryState::new(policy(100, 10_000));
        let delays: Vec<u128> = (0..4).map(|_| state.record_failure().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
        assert_eq!(state.failures(), 4);
    }

    #[test]
    fn delays_are_non_decreasing_and_capped_for_any_streak() {
        for (base, max) in [(1, 1), (1, 7), (250, 1_000), (1_000, 300_000), (500, 100)] {
            let p = policy(base, max);
            let mut state = RetryState::new(p);
            let mut previous = Duration::ZERO;
            for n in 0..200 {
                let delay = state.record_failure();
                assert!(delay >= previous, "delay decreased at failure {n}");
                assert!(delay <= p.max, "delay exceeded cap at failure {n}");
                previous = delay;
            }
            assert_eq!(previous, p.max);
        }
    }

    #[test]
    fn success_resets_to_baseline() {
        let mut state = RetryState::new(policy(100, 10_000));
        state.record_failure();
        state.record_failure();
        state.reset();
        assert_eq!(state.failures(), 0);
        assert_eq!(state.current_delay(), Duration::ZERO);
        assert_eq!(state.record_failure(), Duration::from_millis(100));
    }

    #[test]
    fn counter_saturates_instead_of_overflowing() {
        let mut state = RetryState::new(policy(1, 2));
        state.failures = u32::MAX;
        state.delay = Duration::from_millis(2);
        assert_eq!(state.record_failure(), Duration::from_millis(2));
        assert_eq!(state.failures(), u32::MAX);
    }
}
