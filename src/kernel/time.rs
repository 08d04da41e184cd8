//! Logical simulation time.
//!
//! The simulator runs on a virtual clock that only ever moves when the
//! executor decides to advance it; nothing here touches wall-clock time.
//! Both [`Instant`] and [`Duration`] are thin wrappers over a `u64` tick
//! count with [`TICK_HZ`] ticks per simulation time unit, which keeps
//! same-tick comparisons exact and lets tests stagger otherwise concurrent
//! completions by a single tick (one thousandth of a unit).

use core::fmt;
use core::ops::{Add, Mul};

/// Timer ticks per simulation time unit.
pub const TICK_HZ: u64 = 1_000;

/// A point on the logical simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant {
    ticks: u64,
}

/// A span of logical simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration {
    ticks: u64,
}

impl Instant {
    /// Simulation start.
    pub const ZERO: Instant = Instant { ticks: 0 };

    pub const fn from_ticks(ticks: u64) -> Instant {
        Instant { ticks }
    }

    /// An instant a whole number of simulation units after start.
    pub const fn from_units(units: u64) -> Instant {
        Instant {
            ticks: units * TICK_HZ,
        }
    }

    /// An instant a fractional number of simulation units after start,
    /// rounded to the nearest tick.
    pub fn from_units_f64(units: f64) -> Instant {
        Instant {
            ticks: (units * TICK_HZ as f64).round() as u64,
        }
    }

    pub const fn as_ticks(&self) -> u64 {
        self.ticks
    }
}

impl Duration {
    pub const fn from_ticks(ticks: u64) -> Duration {
        Duration { ticks }
    }

    /// A span of a whole number of simulation units.
    pub const fn from_units(units: u64) -> Duration {
        Duration {
            ticks: units * TICK_HZ,
        }
    }

    /// A span of a fractional number of simulation units, rounded to the
    /// nearest tick.
    pub fn from_units_f64(units: f64) -> Duration {
        Duration {
            ticks: (units * TICK_HZ as f64).round() as u64,
        }
    }

    pub const fn as_ticks(&self) -> u64 {
        self.ticks
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant {
            ticks: self.ticks + rhs.ticks,
        }
    }
}

impl Add<Duration> for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration {
            ticks: self.ticks + rhs.ticks,
        }
    }
}

impl Mul<u32> for Duration {
    type Output = Duration;

    fn mul(self, rhs: u32) -> Duration {
        Duration {
            ticks: self.ticks * rhs as u64,
        }
    }
}

/// Render a tick count as simulation units, trimming trailing zeros from
/// the fractional part ("5", "2.5", "5.001").
fn fmt_ticks(ticks: u64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let units = ticks / TICK_HZ;
    let frac = ticks % TICK_HZ;
    if frac == 0 {
        write!(f, "{units}")
    } else {
        let digits = format!("{frac:03}");
        write!(f, "{units}.{}", digits.trim_end_matches('0'))
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_ticks(self.ticks, f)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_ticks(self.ticks, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversions_are_tick_exact() {
        assert_eq!(Instant::from_units(5), Instant::from_ticks(5_000));
        assert_eq!(Instant::from_units_f64(5.001), Instant::from_ticks(5_001));
        assert_eq!(Duration::from_units_f64(1e-3), Duration::from_ticks(1));
        assert_eq!(Duration::from_units_f64(2.5), Duration::from_ticks(2_500));
    }

    #[test]
    fn arithmetic() {
        let t = Instant::from_units(10) + Duration::from_units(5);
        assert_eq!(t, Instant::from_units(15));
        assert_eq!(Duration::from_units(20) * 3, Duration::from_units(60));
        assert_eq!(
            Duration::from_units(5) + Duration::from_ticks(1),
            Duration::from_ticks(5_001)
        );
    }

    #[test]
    fn display_trims_fractional_ticks() {
        assert_eq!(Instant::from_units(5).to_string(), "5");
        assert_eq!(Instant::from_units_f64(5.001).to_string(), "5.001");
        assert_eq!(Instant::from_units_f64(2.5).to_string(), "2.5");
        assert_eq!(Duration::from_ticks(0).to_string(), "0");
    }
}
