//! Clock definitions for ticking components.
//!
//! A [`Freq`] describes a component clock as an integer period in virtual
//! time units. All tick scheduling is aligned to the boundaries of that
//! period, so two components on the same clock always tick at identical
//! timestamps.
//!
//! # Alignment
//!
//! Given a time `t` and a period `Δt`:
//!
//! | Operation | Formula |
//! |-----------|---------|
//! | `this_tick` | `⌈t / Δt⌉ × Δt` |
//! | `next_tick` | `(⌊t / Δt⌋ + 1) × Δt` |
//! | `cycle` | `⌊t / Δt⌋` |
//!
//! # Example
//!
//! ```
//! use lockstep::freq::Freq;
//!
//! let clock = Freq::new(10);
//! assert_eq!(clock.this_tick(103), 110);
//! assert_eq!(clock.this_tick(100), 100);
//! assert_eq!(clock.next_tick(100), 110);
//! ```

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// A clock expressed as a period between consecutive ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Freq {
    period: SimTime,
}

impl Freq {
    /// Creates a clock with the given period.
    ///
    /// # Panics
    /// Panics if `period` is zero; a zero-period clock can never advance.
    pub fn new(period: SimTime) -> Self {
        assert!(period > 0, "clock period must be positive");
        Self { period }
    }

    /// Returns the tick period.
    pub fn period(&self) -> SimTime {
        self.period
    }

    /// Returns the earliest tick boundary at or after `now`.
    ///
    /// Formula: `⌈t / Δt⌉ × Δt`
    #[inline]
    pub fn this_tick(&self, now: SimTime) -> SimTime {
        if now == 0 {
            return 0;
        }
        now.div_ceil(self.period) * self.period
    }

    /// Returns the first tick boundary strictly after `now`.
    ///
    /// If `now` is already on a boundary, the *next* boundary is returned.
    #[inline]
    pub fn next_tick(&self, now: SimTime) -> SimTime {
        ((now / self.period) + 1) * self.period
    }

    /// Returns the tick boundary `n` cycles after `now`'s own boundary.
    #[inline]
    pub fn n_cycles_later(&self, n: u64, now: SimTime) -> SimTime {
        self.this_tick(now) + n * self.period
    }

    /// Returns the number of complete cycles that elapsed before `now`.
    #[inline]
    pub fn cycle(&self, now: SimTime) -> u64 {
        now / self.period
    }

    /// Checks if a time is exactly on a tick boundary.
    #[inline]
    pub fn is_on_boundary(&self, now: SimTime) -> bool {
        now % self.period == 0
    }
}

impl Default for Freq {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_this_tick() {
        let clock = Freq::new(10);

        assert_eq!(clock.this_tick(0), 0);
        assert_eq!(clock.this_tick(1), 10);
        assert_eq!(clock.this_tick(100), 100);
        assert_eq!(clock.this_tick(101), 110);
        assert_eq!(clock.this_tick(999), 1000);
    }

    #[test]
    fn test_next_tick() {
        let clock = Freq::new(10);

        assert_eq!(clock.next_tick(0), 10);
        assert_eq!(clock.next_tick(100), 110);
        assert_eq!(clock.next_tick(103), 110);

        let unit = Freq::new(1);
        assert_eq!(unit.next_tick(41), 42);
    }

    #[test]
    fn test_cycle_helpers() {
        let clock = Freq::new(10);

        assert_eq!(clock.cycle(0), 0);
        assert_eq!(clock.cycle(15), 1);
        assert_eq!(clock.cycle(100), 10);
        assert_eq!(clock.n_cycles_later(3, 95), 130);

        assert!(clock.is_on_boundary(100));
        assert!(!clock.is_on_boundary(103));
        assert!(clock.is_on_boundary(0));
    }

    #[test]
    #[should_panic(expected = "clock period must be positive")]
    fn test_zero_period_rejected() {
        let _ = Freq::new(0);
    }

    #[test]
    fn test_freq_serialization() {
        let clock = Freq::new(4);
        let json = serde_json::to_string(&clock).unwrap();
        let restored: Freq = serde_json::from_str(&json).unwrap();

        assert_eq!(clock, restored);
    }
}
