//! Growing poll interval used while waiting on an execution unit.
//!
//! Short units are noticed quickly; long ones stop hammering the
//! backend. The interval doubles after each poll, capped at `max`.
use std::time::Duration;

pub struct Backoff {
    max: Duration,
    current: Duration,
    /// Number of delays handed out so far.
    pub polls: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            max,
            current: initial.min(max),
            polls: 0,
        }
    }

    /// Returns the delay to sleep before the next poll and doubles
    /// the following one (up to `max`).
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.polls += 1;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_cap() {
        let mut b = Backoff::new(Duration::from_millis(500), Duration::from_secs(5));
        assert_eq!(b.next_delay(), Duration::from_millis(500));
        assert_eq!(b.next_delay(), Duration::from_millis(1000));
        assert_eq!(b.next_delay(), Duration::from_millis(2000));
        assert_eq!(b.next_delay(), Duration::from_millis(4000));
        // 8s capped at 5s
        assert_eq!(b.next_delay(), Duration::from_secs(5));
        assert_eq!(b.next_delay(), Duration::from_secs(5));
        assert_eq!(b.polls, 6);
    }

    #[test]
    fn test_initial_above_max_is_clamped() {
        let mut b = Backoff::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }
}
