//! Nodes and the protocol hook.
//!
//! A node bundles a named radio with its schedule manager and a protocol.
//! The protocol surface is deliberately thin: higher layers get exactly one
//! callback per completed receive window and build their own state machines
//! on top.

use std::rc::Rc;

use crate::kernel::Sim;
use crate::packet::DataPacket;
use crate::radio::Radio;
use crate::schedule_manager::ScheduleManager;

/// Higher-layer hook for received packets.
pub trait Protocol {
    /// Called exactly once per completed receive window, with the delivered
    /// packet if the window caught one.
    fn handle_packet(&self, packet: Option<DataPacket>);
}

/// Protocol shell that ignores everything it hears.
#[derive(Debug, Default)]
pub struct IdleProtocol;

impl Protocol for IdleProtocol {
    fn handle_packet(&self, _packet: Option<DataPacket>) {}
}

/// A node with its radio peripherals.
pub struct Node {
    name: String,
    radio: Rc<Radio>,
    schedule_manager: Rc<ScheduleManager>,
    protocol: Rc<dyn Protocol>,
}

impl Node {
    /// A node with the default (no-op) protocol.
    pub fn new(sim: &Sim, name: &str) -> Node {
        Node::with_protocol(sim, name, Rc::new(IdleProtocol))
    }

    /// A node whose receive windows report to `protocol`.
    pub fn with_protocol(sim: &Sim, name: &str, protocol: Rc<dyn Protocol>) -> Node {
        let radio = Radio::new(sim, name);
        let schedule_manager =
            ScheduleManager::new(sim, Rc::clone(&radio), Rc::clone(&protocol));
        Node {
            name: name.to_string(),
            radio,
            schedule_manager,
            protocol,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn radio(&self) -> &Rc<Radio> {
        &self.radio
    }

    pub fn schedule_manager(&self) -> &Rc<ScheduleManager> {
        &self.schedule_manager
    }

    pub fn protocol(&self) -> &Rc<dyn Protocol> {
        &self.protocol
    }
}
