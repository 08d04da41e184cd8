//! Error types for the simulator.
//!
//! Everything here is a fail-fast caller error: bad construction parameters,
//! querying an expired schedule, or routing to a node that does not exist.
//! Routine negative outcomes (dropped packets, collisions, empty receive
//! windows) are not errors; they land in the event histories instead.

use thiserror::Error;

use crate::kernel::time::Duration;

/// Errors that can occur when configuring or driving a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// A schedule's inter-event delay is shorter than its event duration, so
    /// consecutive firings would overlap.
    #[error("inter-event delay ({delay}) must be at least the event duration ({duration})")]
    DelayShorterThanDuration {
        /// Duration of a single scheduled event.
        duration: Duration,
        /// Delay between the starts of consecutive events.
        delay: Duration,
    },

    /// A transmit schedule was built without a packet constructor.
    #[error("a transmit schedule requires a packet constructor")]
    MissingPacketConstructor,

    /// A schedule was built with a radio mode other than RX or TX.
    #[error("schedule mode must be RX or TX")]
    InvalidScheduleMode,

    /// `next_time` was queried on a schedule that has fired all its events.
    #[error("schedule has expired, no further event times exist")]
    ScheduleExpired,

    /// A packet named a destination no node in the world answers to.
    #[error("packet addressed to unknown node '{0}'")]
    UnknownDestination(String),

    /// A scenario schedule referenced a node the scenario does not define.
    #[error("scenario references unknown node '{0}'")]
    UnknownNode(String),

    /// A scenario file failed to parse.
    #[error("invalid scenario: {0}")]
    Scenario(#[from] serde_json::Error),
}
