//! Simulation time passed to processors.

use std::time::Duration;

/// Timing of one tick. The manager passes it through to processors untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Time {
    /// Time since the previous tick.
    pub delta: Duration,
    /// Total simulated time, including this tick.
    pub elapsed: Duration,
    /// Tick counter, starting at 1 for the first advanced tick.
    pub tick: u64,
}

impl Time {
    /// Time before the first tick.
    #[must_use]
    pub fn start() -> Self {
        Self::default()
    }

    /// The time of the next tick, `delta` later.
    #[must_use]
    pub fn advance(self, delta: Duration) -> Self {
        Self {
            delta,
            elapsed: self.elapsed + delta,
            tick: self.tick + 1,
        }
    }

    /// `delta` in seconds.
    #[must_use]
    pub fn delta_seconds(&self) -> f64 {
        self.delta.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance() {
        let t = Time::start()
            .advance(Duration::from_millis(16))
            .advance(Duration::from_millis(20));
        assert_eq!(t.tick, 2);
        assert_eq!(t.delta, Duration::from_millis(20));
        assert_eq!(t.elapsed, Duration::from_millis(36));
        assert!((t.delta_seconds() - 0.02).abs() < 1e-9);
    }
}
