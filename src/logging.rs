//! Logger setup with logical-clock timestamps.
//!
//! Formatted records carry the simulation clock instead of wall-clock time,
//! so a log line reads as "what happened at tick N". The executor publishes
//! the clock to a thread-local cell every time it advances; the formatter
//! reads it back without needing a handle to any particular simulation.

use std::cell::Cell;
use std::io::Write;

use env_logger::Builder;
use log::{LevelFilter, SetLoggerError};

use crate::kernel::time::Instant;

thread_local! {
    static SIM_NOW: Cell<Instant> = const { Cell::new(Instant::ZERO) };
}

pub(crate) fn set_sim_now(now: Instant) {
    SIM_NOW.with(|cell| cell.set(now));
}

/// The logical time most recently published by an executor on this thread.
pub fn sim_now() -> Instant {
    SIM_NOW.with(|cell| cell.get())
}

/// Initialise the global logger at the given verbosity, replacing wall-clock
/// timestamps with the logical simulation clock.
pub fn init(verbosity: LevelFilter) {
    let _ = try_init(verbosity);
}

/// Like [`init`], but reports when a logger is already installed (useful in
/// tests, where many simulations share one process).
pub fn try_init(verbosity: LevelFilter) -> Result<(), SetLoggerError> {
    Builder::new()
        .filter_level(verbosity)
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<10}:Time {:<12}:{:<6}:{}",
                record.target(),
                sim_now().to_string(),
                record.level().to_string(),
                record.args()
            )
        })
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_published_clock_is_readable_back() {
        set_sim_now(Instant::from_units(42));
        assert_eq!(sim_now(), Instant::from_units(42));
    }
}
