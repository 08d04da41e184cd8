//! Simulation kernel: logical clock, cooperative executor, shared events.
//!
//! ## Module Organization
//!
//! - `time`: tick-based `Instant`/`Duration` for the logical clock
//! - `executor`: the deterministic single-threaded task executor
//! - `event`: re-arming one-shot broadcast events and `any_of`
//!
//! Composite waits over two futures use `embassy_futures::select` /
//! `embassy_futures::join` directly; the kernel only adds what those
//! combinators cannot express (the multi-event drain in [`any_of`]).

pub mod event;
pub mod executor;
pub mod time;

pub use event::{AnyOf, EventListener, SharedEvent, any_of};
pub use executor::{Interrupt, Join, Sim, Sleep, TaskHandle};
