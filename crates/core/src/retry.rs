use rand::Rng;
use std::time::Duration;

/// Bounded retry with a delay scaled by attempt count plus random jitter,
/// so many channels failing together do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_jitter,
        }
    }

    /// True once `attempt` has reached the ceiling; the failure is then
    /// surfaced as permanent instead of re-submitted.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay * attempt.max(1);
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return scaled;
        }
        scaled + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(10, Duration::from_millis(500), Duration::from_millis(250))
    }

    #[test]
    fn delay_scales_with_attempt() {
        let p = policy();
        for attempt in 1..5u32 {
            let d = p.delay(attempt);
            let floor = p.base_delay * attempt;
            assert!(d >= floor);
            assert!(d <= floor + p.max_jitter);
        }
    }

    #[test]
    fn attempt_zero_is_treated_as_first() {
        let p = policy();
        assert!(p.delay(0) >= p.base_delay);
    }

    #[test]
    fn exhaustion_at_ceiling() {
        let p = policy();
        assert!(!p.exhausted(9));
        assert!(p.exhausted(10));
        assert!(p.exhausted(11));
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let p = RetryPolicy::new(3, Duration::from_millis(100), Duration::ZERO);
        assert_eq!(p.delay(2), Duration::from_millis(200));
    }
}
