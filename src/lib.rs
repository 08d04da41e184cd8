//! # radionet
//!
//! A deterministic discrete-event simulator for wireless radio networks.
//!
//! ## Purpose
//!
//! The simulator models a set of named nodes sharing a radio medium. Each
//! node owns a [`Radio`] (a strict OFF/RX/TX mode machine), a
//! [`ScheduleManager`] driving repeating transmit/receive campaigns, and a
//! [`Protocol`] hook receiving whatever its radio catches. The [`World`]
//! observes all transmissions, routes them (unicast or broadcast), gates
//! them on receiver mode and signal strength, and models on-air collisions
//! per receiver.
//!
//! ## Architecture Overview
//!
//! Everything runs as cooperative tasks on the crate's own single-threaded
//! executor ([`kernel::Sim`]) with a purely logical clock: time only moves
//! when no task can make progress, which makes every run reproducible down
//! to the tick. Radios publish transmissions through re-arming one-shot
//! events ([`kernel::SharedEvent`]); the world drains all transmissions
//! that fire in the same tick in a single wake-up, and represents each
//! in-flight packet at each receiver as an interruptible task whose
//! interruption *is* the collision.
//!
//! Observable output is in-memory only: bounded per-radio TX/RX event
//! histories and a bounded world collision history.

pub mod error;
pub mod kernel;
pub mod logging;
pub mod node;
pub mod packet;
pub mod radio;
pub mod scenario;
pub mod schedule;
pub mod schedule_manager;
pub mod world;

pub use error::SimError;
pub use kernel::time::{Duration, Instant, TICK_HZ};
pub use kernel::{Interrupt, SharedEvent, Sim, TaskHandle, any_of};
pub use node::{IdleProtocol, Node, Protocol};
pub use packet::{BROADCAST, DataPacket, FieldValue, Identifier, RadioPacket};
pub use radio::{
    DEFAULT_THRESHOLD_RSSI, HISTORY_CAPACITY, PacketEvent, PacketStatus, Radio, RadioMode, TX_RSSI,
};
pub use scenario::Scenario;
pub use schedule::{PacketConstructor, Schedule, ScheduleFiring, ScheduleState};
pub use schedule_manager::{ScheduleEvent, ScheduleManager};
pub use world::{COLLISION_HISTORY_CAPACITY, CollisionEvent, World};
