//! The shared medium connecting every radio.
//!
//! A single long-running communications task observes all transmissions,
//! routes each packet to its recipients, and models the on-air contention at
//! every receiver. Collision detection is per receiver: the first feasible
//! packet to arrive owns a delivery tracker spanning its airtime, and any
//! further feasible arrival interrupts that tracker, destroying both
//! deliveries while still being logged. A tracker always runs out its full
//! airtime so that later overlapping arrivals are recorded too.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use log::{debug, error};

use crate::error::SimError;
use crate::kernel::time::Instant;
use crate::kernel::{Sim, any_of};
use crate::node::Node;
use crate::packet::{BROADCAST, RadioPacket};
use crate::radio::Radio;

/// Capacity of the world's collision history ring.
pub const COLLISION_HISTORY_CAPACITY: usize = 100;

/// Log record for two packets meeting on the air at a common receiver.
///
/// The packet pair is unordered: equality is commutative in the two packet
/// fields.
#[derive(Debug, Clone)]
pub struct CollisionEvent {
    pub time: Instant,
    pub packet_a: RadioPacket,
    pub packet_b: RadioPacket,
}

impl PartialEq for CollisionEvent {
    fn eq(&self, other: &CollisionEvent) -> bool {
        self.time == other.time
            && ((self.packet_a == other.packet_a && self.packet_b == other.packet_b)
                || (self.packet_a == other.packet_b && self.packet_b == other.packet_a))
    }
}

impl fmt::Display for CollisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time: {}, RadioPacket A: ({}), RadioPacket B: ({})",
            self.time, self.packet_a, self.packet_b
        )
    }
}

/// Environment in which nodes exist; owns packet routing and the on-air
/// contention model.
pub struct World {
    sim: Sim,
    /// Radios by node name, in node insertion order.
    radios: Vec<(String, Rc<Radio>)>,
    collision_history: RefCell<VecDeque<CollisionEvent>>,
}

impl World {
    /// Build the world over a set of nodes and start the communications
    /// task.
    pub fn new<'a>(sim: &Sim, nodes: impl IntoIterator<Item = &'a Node>) -> Rc<World> {
        let radios = nodes
            .into_iter()
            .map(|node| (node.name().to_string(), Rc::clone(node.radio())))
            .collect();
        let world = Rc::new(World {
            sim: sim.clone(),
            radios,
            collision_history: RefCell::new(VecDeque::new()),
        });

        let comms = Rc::clone(&world);
        sim.spawn(async move {
            if let Err(err) = comms.communications().await {
                error!("[world] routing stopped: {err}");
            }
        });

        world
    }

    /// Snapshot of the collision history, oldest first.
    pub fn collisions(&self) -> Vec<CollisionEvent> {
        self.collision_history.borrow().iter().cloned().collect()
    }

    fn push_collision(&self, event: CollisionEvent) {
        let mut history = self.collision_history.borrow_mut();
        if history.len() >= COLLISION_HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Route transmitted packets between nodes, forever.
    async fn communications(self: Rc<Self>) -> Result<(), SimError> {
        loop {
            // Wait for any radio to transmit; co-firing transmissions in the
            // same tick are all drained in this one wake-up.
            let fired = {
                let listeners = self
                    .radios
                    .iter()
                    .map(|(_, radio)| radio.transmit_event().listen())
                    .collect();
                any_of(listeners).await
            };

            for (_, packet) in fired {
                self.route(&packet)?;
            }
        }
    }

    /// Deliver one packet to every feasible recipient.
    fn route(self: &Rc<Self>, packet: &RadioPacket) -> Result<(), SimError> {
        let recipients: Vec<&Rc<Radio>> = if packet.dest() == BROADCAST {
            self.radios
                .iter()
                .filter(|(name, _)| name.as_str() != packet.src())
                .map(|(_, radio)| radio)
                .collect()
        } else {
            let radio = self
                .radios
                .iter()
                .find(|(name, _)| name.as_str() == packet.dest())
                .map(|(_, radio)| radio)
                .ok_or_else(|| SimError::UnknownDestination(packet.dest().to_string()))?;
            vec![radio]
        };

        for radio in recipients {
            if !radio.notify_intent_to_deliver(packet) {
                continue;
            }
            match radio.pending_rx().filter(|tracker| tracker.is_alive()) {
                // An earlier packet is already painting this receiver; the
                // new arrival destroys it (and is itself lost).
                Some(tracker) => tracker.interrupt(packet.clone()),
                None => {
                    let tracker = self.sim.spawn(Self::pending_transmit(
                        Rc::clone(self),
                        Rc::clone(radio),
                        packet.clone(),
                    ));
                    radio.set_pending_rx(tracker);
                }
            }
        }
        Ok(())
    }

    /// Track one packet's airtime at one receiver.
    ///
    /// Runs from the packet's arrival to its end of airtime. Interrupting it
    /// with another `RadioPacket` records a collision; interrupting it with
    /// a string means the receiver left RX mode. Either way the delivery is
    /// poisoned, but the tracker keeps waiting so every further arrival
    /// inside the original window is logged as well. The window is never
    /// extended: a packet starting exactly at the end of airtime counts as a
    /// fresh reception.
    async fn pending_transmit(self: Rc<Self>, radio: Rc<Radio>, packet: RadioPacket) {
        let end_time = self.sim.now() + packet.duration();
        let mut collision = false;

        while self.sim.now() < end_time {
            match self.sim.sleep_until(end_time).await {
                Ok(()) => {}
                Err(interrupt) => {
                    match interrupt.downcast::<RadioPacket>() {
                        Ok(interrupting) => {
                            debug!(
                                "[world] ({}) collides with ({})",
                                interrupting.data(),
                                packet.data()
                            );
                            self.push_collision(CollisionEvent {
                                time: self.sim.now(),
                                packet_a: *interrupting,
                                packet_b: packet.clone(),
                            });
                        }
                        Err(interrupt) => {
                            if let Some(reason) = interrupt.downcast_ref::<&str>() {
                                debug!("[world] delivery interrupted: {reason}");
                            }
                        }
                    }
                    collision = true;
                }
            }
        }

        if !collision {
            radio.receive_event().reactivate(packet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::time::Duration;
    use crate::packet::DataPacket;
    use crate::radio::TX_RSSI;

    fn radio_packet(src: &str, dest: &str) -> RadioPacket {
        RadioPacket::new(
            DataPacket::with_contents(src, dest, [("msg", "hi")]),
            Duration::from_units(5),
            TX_RSSI,
        )
    }

    #[test]
    fn collision_equality_is_commutative_in_the_packet_pair() {
        let b_to_a = radio_packet("B", "A");
        let c_to_a = radio_packet("C", "A");
        let time = Instant::from_units(2);

        let one = CollisionEvent {
            time,
            packet_a: b_to_a.clone(),
            packet_b: c_to_a.clone(),
        };
        let other = CollisionEvent {
            time,
            packet_a: c_to_a.clone(),
            packet_b: b_to_a.clone(),
        };
        assert_eq!(one, other);

        let later = CollisionEvent {
            time: Instant::from_units(3),
            packet_a: b_to_a,
            packet_b: c_to_a,
        };
        assert_ne!(one, later);
    }
}
