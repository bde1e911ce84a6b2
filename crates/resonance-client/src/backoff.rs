//! Reconnect delays: exponential, capped, with jitter.

use rand::Rng;
use std::time::Duration;

const INITIAL_DELAY: Duration = Duration::from_millis(250);
const MAX_DELAY: Duration = Duration::from_secs(30);
const JITTER: f64 = 0.2;

/// Delay schedule for reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_DELAY, MAX_DELAY)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt, then double the base.
    /// The result stays within ±20% of the base and never exceeds the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        let factor = rand::thread_rng().gen_range((1.0 - JITTER)..=(1.0 + JITTER));
        base.mul_f64(factor).min(self.max)
    }

    /// Back to the initial delay after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Base of the next delay, before jitter.
    pub fn current(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within_jitter(delay: Duration, base: Duration) -> bool {
        delay >= base.mul_f64(1.0 - JITTER) && delay <= base.mul_f64(1.0 + JITTER)
    }

    #[test]
    fn doubles_up_to_ceiling() {
        let mut backoff = Backoff::default();
        let mut expected = INITIAL_DELAY;
        for _ in 0..12 {
            let delay = backoff.next_delay();
            assert!(within_jitter(delay, expected), "{:?} vs {:?}", delay, expected);
            assert!(delay <= MAX_DELAY);
            expected = (expected * 2).min(MAX_DELAY);
        }
        assert_eq!(backoff.current(), MAX_DELAY);
    }

    #[test]
    fn reset_restarts_schedule() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(1));
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(10));
        assert!(within_jitter(backoff.next_delay(), Duration::from_millis(10)));
    }
}
