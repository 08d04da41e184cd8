//! Scenario configuration.
//!
//! A scenario is a JSON description of a complete simulation run: the nodes
//! (with their radio thresholds) and the traffic campaigns to lay over
//! them. Transmit campaigns stamp an incrementing `seq` field next to their
//! template payload, so every firing carries a fresh packet.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Deserialize;

use crate::error::SimError;
use crate::kernel::Sim;
use crate::kernel::time::{Duration, Instant};
use crate::node::Node;
use crate::packet::{BROADCAST, DataPacket, FieldValue};
use crate::radio::DEFAULT_THRESHOLD_RSSI;
use crate::schedule::Schedule;
use crate::world::World;

/// Root structure describing an entire simulation run.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Simulation horizon, in time units.
    pub run_until: f64,
    /// All nodes present in the world.
    pub nodes: Vec<NodeSpec>,
    /// Traffic campaigns laid over the nodes.
    #[serde(default)]
    pub schedules: Vec<ScheduleSpec>,
}

/// One node and its radio configuration.
#[derive(Debug, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    /// Minimum RSSI this node's radio accepts.
    #[serde(default = "default_threshold_rssi")]
    pub threshold_rssi: f32,
}

fn default_threshold_rssi() -> f32 {
    DEFAULT_THRESHOLD_RSSI
}

/// Direction of a scheduled campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Tx,
    Rx,
}

/// One repeating campaign, in time units.
#[derive(Debug, Deserialize)]
pub struct ScheduleSpec {
    /// Node the campaign runs on.
    pub node: String,
    pub mode: ScheduleMode,
    pub start: f64,
    pub duration: f64,
    pub delay: f64,
    pub num: u32,
    /// Destination for transmit campaigns; defaults to broadcast.
    #[serde(default = "default_dest")]
    pub dest: String,
    /// Template payload copied into every packet of a transmit campaign.
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
}

fn default_dest() -> String {
    BROADCAST.to_string()
}

impl Scenario {
    /// Parse a scenario from JSON text.
    pub fn from_json(text: &str) -> Result<Scenario, SimError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Materialise the scenario: build the nodes and world and register
    /// every campaign with its node's schedule manager.
    pub fn build(&self, sim: &Sim) -> Result<(Vec<Node>, Rc<World>), SimError> {
        let nodes: Vec<Node> = self
            .nodes
            .iter()
            .map(|spec| {
                let node = Node::new(sim, &spec.name);
                node.radio().set_threshold_rssi(spec.threshold_rssi);
                node
            })
            .collect();
        let world = World::new(sim, &nodes);

        for spec in &self.schedules {
            let node = nodes
                .iter()
                .find(|node| node.name() == spec.node)
                .ok_or_else(|| SimError::UnknownNode(spec.node.clone()))?;

            let start = Instant::from_units_f64(spec.start);
            let duration = Duration::from_units_f64(spec.duration);
            let delay = Duration::from_units_f64(spec.delay);

            let schedule = match spec.mode {
                ScheduleMode::Rx => Schedule::receive(start, duration, delay, spec.num)?,
                ScheduleMode::Tx => {
                    let src = spec.node.clone();
                    let dest = spec.dest.clone();
                    let template: Vec<(String, FieldValue)> = spec
                        .payload
                        .iter()
                        .map(|(name, value)| (name.clone(), FieldValue::from(value.clone())))
                        .collect();
                    let seq = Cell::new(0i64);
                    Schedule::transmit(start, duration, delay, spec.num, move || {
                        seq.set(seq.get() + 1);
                        let mut contents = template.clone();
                        contents.push(("seq".to_string(), FieldValue::Int(seq.get())));
                        DataPacket::with_contents(src.clone(), dest.clone(), contents)
                    })?
                }
            };
            node.schedule_manager().add(schedule);
        }

        Ok((nodes, world))
    }

    /// The run horizon as an instant.
    pub fn horizon(&self) -> Instant {
        Instant::from_units_f64(self.run_until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "run_until": 120,
        "nodes": [
            { "name": "alice" },
            { "name": "bob", "threshold_rssi": 2.0 }
        ],
        "schedules": [
            {
                "node": "alice", "mode": "tx",
                "start": 10, "duration": 5, "delay": 30, "num": 3,
                "payload": { "greeting": "hello" }
            },
            {
                "node": "bob", "mode": "rx",
                "start": 9, "duration": 7, "delay": 30, "num": 3
            }
        ]
    }"#;

    #[test]
    fn parses_with_defaults() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        assert_eq!(scenario.horizon(), Instant::from_units(120));
        assert_eq!(scenario.nodes[0].threshold_rssi, DEFAULT_THRESHOLD_RSSI);
        assert_eq!(scenario.nodes[1].threshold_rssi, 2.0);
        assert_eq!(scenario.schedules[0].dest, BROADCAST);
        assert_eq!(scenario.schedules[0].mode, ScheduleMode::Tx);
        assert_eq!(scenario.schedules[1].payload.len(), 0);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Scenario::from_json("{ not json"),
            Err(SimError::Scenario(_))
        ));
    }

    #[test]
    fn build_rejects_unknown_nodes() {
        let text = r#"{
            "run_until": 10,
            "nodes": [ { "name": "alice" } ],
            "schedules": [
                { "node": "ghost", "mode": "rx",
                  "start": 0, "duration": 1, "delay": 2, "num": 1 }
            ]
        }"#;
        let scenario = Scenario::from_json(text).unwrap();
        let sim = Sim::new();
        assert!(matches!(
            scenario.build(&sim),
            Err(SimError::UnknownNode(name)) if name == "ghost"
        ));
    }

    #[test]
    fn transmit_campaigns_stamp_a_sequence_field() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        let sim = Sim::new();
        let (nodes, _world) = scenario.build(&sim).unwrap();
        sim.run_until(scenario.horizon());

        let tx = nodes[0].radio().tx_history();
        assert_eq!(tx.len(), 3);
        for (idx, event) in tx.iter().enumerate() {
            let packet = event.packet.as_ref().unwrap();
            assert_eq!(
                packet.data().data().get("seq"),
                Some(&FieldValue::Int(idx as i64 + 1))
            );
            assert_eq!(
                packet.data().data().get("greeting"),
                Some(&FieldValue::Text("hello".to_string()))
            );
        }
    }
}
