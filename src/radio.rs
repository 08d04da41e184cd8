//! Per-node radio state machine.
//!
//! A radio is the interface between a node and the world. It is a strict
//! mode machine (OFF / RX / TX): transmitting parks it in TX for the whole
//! airtime, receiving parks it in RX for the scheduled window, and the world
//! is only ever allowed to hand over a packet while the window is open.
//! Everything observable about a radio ends up in its two bounded event
//! histories, which is what the tests (and any downstream tooling) inspect.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_futures::select::{Either, select};
use log::debug;

use crate::kernel::time::{Duration, Instant};
use crate::kernel::{SharedEvent, Sim, TaskHandle};
use crate::packet::{DataPacket, RadioPacket};

/// Capacity of each per-radio event history ring.
pub const HISTORY_CAPACITY: usize = 100;

/// Minimum RSSI a packet needs to pass the delivery gate, unless overridden
/// per radio.
pub const DEFAULT_THRESHOLD_RSSI: f32 = 0.1;

/// Signal strength stamped on every transmitted packet.
pub const TX_RSSI: f32 = 1.0;

/// Interrupt cause handed to a pending delivery when the receiver closes its
/// window mid-air.
pub(crate) const RX_ABANDONED: &str = "Radio stopped being in receive mode!";

/// States that a radio may be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioMode {
    /// Neither transmitting nor receiving.
    #[default]
    Off,
    /// Listening for packets.
    Rx,
    /// Occupying the medium.
    Tx,
}

/// Outcome recorded for a packet traversing the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    /// Transmission held the medium for its whole airtime.
    SuccessTx,
    /// A packet survived its airtime unscathed and was delivered.
    SuccessRx,
    /// A receive window closed without delivering anything.
    NothingRx,
    /// A packet arrived while the radio was not in RX mode.
    DroppedMode,
    /// A packet arrived below the radio's RSSI threshold.
    DroppedRssi,
}

/// Log record kept in the radio histories.
///
/// `time` is the end of airtime for `SuccessTx`/`SuccessRx`, the moment of
/// arrival for drops, and the end of the window for `NothingRx` (which is
/// also the only status without a packet).
#[derive(Debug, Clone, PartialEq)]
pub struct PacketEvent {
    pub status: PacketStatus,
    pub time: Instant,
    pub packet: Option<RadioPacket>,
}

impl PacketEvent {
    /// Filter a history slice down to events with the given status.
    pub fn with_status(
        events: &[PacketEvent],
        status: PacketStatus,
    ) -> impl Iterator<Item = &PacketEvent> {
        events.iter().filter(move |event| event.status == status)
    }
}

/// Interface between a node and the world allowing the exchange of packets.
pub struct Radio {
    sim: Sim,
    name: String,
    mode: Cell<RadioMode>,
    threshold_rssi: Cell<f32>,
    /// Fired towards the world when a transmission starts.
    transmit_event: SharedEvent<RadioPacket>,
    /// Fired by the world when a packet survives its airtime here.
    receive_event: SharedEvent<RadioPacket>,
    /// Delivery tracker currently painting this radio, if any. A packet must
    /// spend its whole airtime on the wire before it can be handed over, and
    /// this is where the world parks that wait.
    pending_rx: RefCell<Option<TaskHandle<()>>>,
    tx_history: RefCell<VecDeque<PacketEvent>>,
    rx_history: RefCell<VecDeque<PacketEvent>>,
}

impl Radio {
    pub fn new(sim: &Sim, node_name: &str) -> Rc<Radio> {
        Rc::new(Radio {
            sim: sim.clone(),
            name: node_name.to_string(),
            mode: Cell::new(RadioMode::Off),
            threshold_rssi: Cell::new(DEFAULT_THRESHOLD_RSSI),
            transmit_event: SharedEvent::new(),
            receive_event: SharedEvent::new(),
            pending_rx: RefCell::new(None),
            tx_history: RefCell::new(VecDeque::new()),
            rx_history: RefCell::new(VecDeque::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> RadioMode {
        self.mode.get()
    }

    pub fn threshold_rssi(&self) -> f32 {
        self.threshold_rssi.get()
    }

    pub fn set_threshold_rssi(&self, threshold: f32) {
        self.threshold_rssi.set(threshold);
    }

    /// Event the world listens on to observe this radio's transmissions.
    pub fn transmit_event(&self) -> &SharedEvent<RadioPacket> {
        &self.transmit_event
    }

    /// Event the world fires to deliver a packet to this radio.
    pub fn receive_event(&self) -> &SharedEvent<RadioPacket> {
        &self.receive_event
    }

    /// Snapshot of the transmit history, oldest first.
    pub fn tx_history(&self) -> Vec<PacketEvent> {
        self.tx_history.borrow().iter().cloned().collect()
    }

    /// Snapshot of the receive history, oldest first.
    pub fn rx_history(&self) -> Vec<PacketEvent> {
        self.rx_history.borrow().iter().cloned().collect()
    }

    pub(crate) fn pending_rx(&self) -> Option<TaskHandle<()>> {
        self.pending_rx.borrow().clone()
    }

    pub(crate) fn set_pending_rx(&self, tracker: TaskHandle<()>) {
        *self.pending_rx.borrow_mut() = Some(tracker);
    }

    fn push_history(history: &RefCell<VecDeque<PacketEvent>>, event: PacketEvent) {
        let mut history = history.borrow_mut();
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Transmit a packet: suspend the radio in TX mode for the airtime and
    /// hand the packet to the world for routing.
    pub async fn transmit(self: Rc<Self>, duration: Duration, packet: DataPacket) {
        self.mode.set(RadioMode::Tx);
        let tx_packet = RadioPacket::new(packet, duration, TX_RSSI);
        self.transmit_event.reactivate(tx_packet.clone());
        debug!("[{}] begins TX. Packet: {}", self.name, tx_packet);

        if self.sim.sleep(duration).await.is_err() {
            // Interrupted mid-air; the transmission never completes.
            return;
        }

        self.mode.set(RadioMode::Off);
        Self::push_history(
            &self.tx_history,
            PacketEvent {
                status: PacketStatus::SuccessTx,
                time: self.sim.now(),
                packet: Some(tx_packet),
            },
        );
        debug!("[{}] completes TX", self.name);
    }

    /// Check whether delivering `packet` here is feasible: the radio must be
    /// in RX mode and the packet above the RSSI threshold.
    ///
    /// Passing the gate does not guarantee delivery; a later collision can
    /// still destroy the packet on the air.
    pub fn notify_intent_to_deliver(&self, packet: &RadioPacket) -> bool {
        if self.mode.get() != RadioMode::Rx {
            let event = PacketEvent {
                status: PacketStatus::DroppedMode,
                time: self.sim.now(),
                packet: Some(packet.clone()),
            };
            debug!("[{}] drops packet, not in RX mode: {:?}", self.name, event);
            Self::push_history(&self.rx_history, event);
            return false;
        }

        if packet.rssi() < self.threshold_rssi.get() {
            let event = PacketEvent {
                status: PacketStatus::DroppedRssi,
                time: self.sim.now(),
                packet: Some(packet.clone()),
            };
            debug!("[{}] drops packet, RSSI too low: {:?}", self.name, event);
            Self::push_history(&self.rx_history, event);
            return false;
        }

        true
    }

    /// Listen for `duration` and return the last packet delivered inside the
    /// window, if any.
    ///
    /// The window keeps listening after a dropped or destroyed packet, so an
    /// early inadequate arrival does not cost the radio a later clean one.
    pub async fn receive(self: Rc<Self>, duration: Duration) -> Option<DataPacket> {
        let end_time = self.sim.now() + duration;
        self.mode.set(RadioMode::Rx);
        debug!("[{}] begins RX. Will complete at {}", self.name, end_time);

        let mut received = None;
        while self.sim.now() < end_time {
            let delivery = self.receive_event.listen();
            let window = self.sim.sleep_until(end_time);
            match select(delivery, window).await {
                Either::First(packet) => {
                    debug!("[{}] receives packet: {}", self.name, packet);
                    Self::push_history(
                        &self.rx_history,
                        PacketEvent {
                            status: PacketStatus::SuccessRx,
                            time: self.sim.now(),
                            packet: Some(packet.clone()),
                        },
                    );
                    received = Some(packet.into_data());
                }
                Either::Second(Ok(())) => {
                    if let Some(tracker) = self.pending_rx.borrow().as_ref()
                        && tracker.is_alive()
                    {
                        // A packet is still painting this radio; tell its
                        // tracker the window closed underneath it.
                        tracker.interrupt(RX_ABANDONED);
                    }
                    if received.is_none() {
                        Self::push_history(
                            &self.rx_history,
                            PacketEvent {
                                status: PacketStatus::NothingRx,
                                time: self.sim.now(),
                                packet: None,
                            },
                        );
                        debug!("[{}] no packet was received", self.name);
                    }
                }
                Either::Second(Err(_)) => {
                    debug!("[{}] RX wait interrupted, still listening", self.name);
                }
            }
        }

        self.mode.set(RadioMode::Off);
        debug!("[{}] completes RX", self.name);
        received
    }
}
