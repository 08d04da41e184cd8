//! Repeating radio campaign descriptors.
//!
//! A schedule describes `num` equally spaced radio events: the k-th firing
//! is due at exactly `start + k * delay` and occupies the radio for
//! `duration`. Transmit schedules synthesise a fresh packet per firing
//! through their constructor; receive schedules just carry the window
//! length.

use std::fmt;

use crate::error::SimError;
use crate::kernel::time::{Duration, Instant};
use crate::packet::DataPacket;
use crate::radio::RadioMode;

/// States that a schedule may be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    /// Participates in next-event selection.
    Active,
    /// All events have fired; the manager can discard it.
    Complete,
    /// Skipped by selection, state otherwise preserved.
    Suspended,
}

/// Constructor invoked once per transmit firing, at the firing tick.
pub type PacketConstructor = Box<dyn FnMut() -> DataPacket>;

enum ScheduleKind {
    Transmit(PacketConstructor),
    Receive,
}

/// Data handed out by [`Schedule::event`] for one firing.
pub enum ScheduleFiring {
    /// Transmit this freshly constructed packet.
    Transmit(DataPacket),
    /// Open a receive window of this length.
    Receive(Duration),
}

/// A schedule for repeating radio events.
pub struct Schedule {
    start: Instant,
    duration: Duration,
    delay: Duration,
    num: u32,
    kind: ScheduleKind,
    state: ScheduleState,
    /// How many events have fired so far; mutated only by `event()`.
    current: u32,
}

impl Schedule {
    /// Build a schedule, validating its parameters.
    ///
    /// Fails when the delay between firings is shorter than a single event
    /// (consecutive events would overlap), when a transmit schedule has no
    /// packet constructor, or when the mode is not RX or TX.
    pub fn new(
        start: Instant,
        duration: Duration,
        delay: Duration,
        num: u32,
        mode: RadioMode,
        packet_constructor: Option<PacketConstructor>,
    ) -> Result<Schedule, SimError> {
        if duration > delay {
            return Err(SimError::DelayShorterThanDuration { duration, delay });
        }
        let kind = match (mode, packet_constructor) {
            (RadioMode::Tx, Some(constructor)) => ScheduleKind::Transmit(constructor),
            (RadioMode::Tx, None) => return Err(SimError::MissingPacketConstructor),
            (RadioMode::Rx, _) => ScheduleKind::Receive,
            (RadioMode::Off, _) => return Err(SimError::InvalidScheduleMode),
        };
        Ok(Schedule {
            start,
            duration,
            delay,
            num,
            kind,
            state: ScheduleState::Active,
            current: 0,
        })
    }

    /// A transmit campaign.
    pub fn transmit(
        start: Instant,
        duration: Duration,
        delay: Duration,
        num: u32,
        packet_constructor: impl FnMut() -> DataPacket + 'static,
    ) -> Result<Schedule, SimError> {
        Schedule::new(
            start,
            duration,
            delay,
            num,
            RadioMode::Tx,
            Some(Box::new(packet_constructor)),
        )
    }

    /// A receive campaign.
    pub fn receive(
        start: Instant,
        duration: Duration,
        delay: Duration,
        num: u32,
    ) -> Result<Schedule, SimError> {
        Schedule::new(start, duration, delay, num, RadioMode::Rx, None)
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn mode(&self) -> RadioMode {
        match self.kind {
            ScheduleKind::Transmit(_) => RadioMode::Tx,
            ScheduleKind::Receive => RadioMode::Rx,
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    /// Take the schedule out of selection without losing its position.
    pub fn suspend(&mut self) {
        if self.state == ScheduleState::Active {
            self.state = ScheduleState::Suspended;
        }
    }

    /// Put a suspended schedule back into selection. The start time is left
    /// untouched.
    pub fn resume(&mut self) {
        if self.state == ScheduleState::Suspended {
            self.state = ScheduleState::Active;
        }
    }

    /// When the next event is due. Idempotent between `event()` calls; fails
    /// once the schedule has fired all its events.
    pub fn next_time(&self) -> Result<Instant, SimError> {
        if self.current < self.num {
            Ok(self.start + self.delay * self.current)
        } else {
            Err(SimError::ScheduleExpired)
        }
    }

    /// Consume one firing: advances the counter and yields the transmit
    /// packet (constructed now) or the receive window. `None` once all
    /// events have fired.
    pub fn event(&mut self) -> Option<ScheduleFiring> {
        if self.current >= self.num {
            return None;
        }
        self.current += 1;
        if self.current == self.num {
            self.state = ScheduleState::Complete;
        }
        Some(match &mut self.kind {
            ScheduleKind::Transmit(construct) => ScheduleFiring::Transmit(construct()),
            ScheduleKind::Receive => ScheduleFiring::Receive(self.duration),
        })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Schedule(start: {}, duration: {}, delay: {}, num: {}, mode: {:?})",
            self.start,
            self.duration,
            self.delay,
            self.num,
            self.mode()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> DataPacket {
        DataPacket::with_contents("A", "B", [("msg", "hi")])
    }

    #[test]
    fn overlapping_firings_are_rejected() {
        let result = Schedule::transmit(
            Instant::ZERO,
            Duration::from_units(10),
            Duration::from_units(5),
            3,
            packet,
        );
        assert!(matches!(
            result,
            Err(SimError::DelayShorterThanDuration { .. })
        ));
    }

    #[test]
    fn transmit_without_a_constructor_is_rejected() {
        let result = Schedule::new(
            Instant::ZERO,
            Duration::from_units(5),
            Duration::from_units(10),
            3,
            RadioMode::Tx,
            None,
        );
        assert!(matches!(result, Err(SimError::MissingPacketConstructor)));
    }

    #[test]
    fn off_mode_is_rejected() {
        let result = Schedule::new(
            Instant::ZERO,
            Duration::from_units(5),
            Duration::from_units(10),
            3,
            RadioMode::Off,
            None,
        );
        assert!(matches!(result, Err(SimError::InvalidScheduleMode)));
    }

    #[test]
    fn next_time_is_idempotent_and_steps_with_event() {
        let mut schedule = Schedule::receive(
            Instant::from_units(10),
            Duration::from_units(5),
            Duration::from_units(20),
            3,
        )
        .unwrap();

        assert_eq!(schedule.next_time().unwrap(), Instant::from_units(10));
        assert_eq!(schedule.next_time().unwrap(), Instant::from_units(10));

        assert!(matches!(
            schedule.event(),
            Some(ScheduleFiring::Receive(d)) if d == Duration::from_units(5)
        ));
        assert_eq!(schedule.next_time().unwrap(), Instant::from_units(30));
        assert_eq!(schedule.state(), ScheduleState::Active);

        schedule.event();
        schedule.event();
        assert_eq!(schedule.state(), ScheduleState::Complete);
        assert!(schedule.next_time().is_err());
        assert!(schedule.event().is_none());
    }

    #[test]
    fn constructor_runs_once_per_firing() {
        let mut calls = 0u32;
        let mut schedule = Schedule::transmit(
            Instant::ZERO,
            Duration::from_units(1),
            Duration::from_units(1),
            2,
            move || {
                calls += 1;
                DataPacket::with_contents("A", "B", [("n", calls as i64)])
            },
        )
        .unwrap();

        let Some(ScheduleFiring::Transmit(first)) = schedule.event() else {
            panic!("expected a transmit firing");
        };
        let Some(ScheduleFiring::Transmit(second)) = schedule.event() else {
            panic!("expected a transmit firing");
        };
        assert_eq!(
            first,
            DataPacket::with_contents("A", "B", [("n", 1i64)])
        );
        assert_eq!(
            second,
            DataPacket::with_contents("A", "B", [("n", 2i64)])
        );
    }

    #[test]
    fn suspend_and_resume_preserve_position() {
        let mut schedule = Schedule::receive(
            Instant::from_units(10),
            Duration::from_units(5),
            Duration::from_units(20),
            2,
        )
        .unwrap();
        schedule.event();
        schedule.suspend();
        assert_eq!(schedule.state(), ScheduleState::Suspended);
        schedule.resume();
        assert_eq!(schedule.state(), ScheduleState::Active);
        assert_eq!(schedule.next_time().unwrap(), Instant::from_units(30));
    }
}
