//! network.rs — lockstep simulation of one tag and its anchors
//!
//! Time advances in 1 ms ticks. Each tick:
//!   1. applies the active scenario (dropouts, clock slips)
//!   2. hands every frame that has arrived to its receiver's queue
//!   3. steps every node
//!   4. puts the frames the nodes sent on the air

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};
use uwb_host::{AnchorConfig, AnchorEntry};
use uwb_types::{NodeAddress, Vec3};

use super::air::{Air, NodeClock, SimRadio};
use super::config::SimConfig;
use super::scenarios::ScenarioConfig;
use super::SimError;
use crate::bridge::HostBridge;
use crate::node::Node;
use crate::radio::RxFrame;
use crate::state::NodeEvent;
use crate::timing::NodeConfig;

pub struct SimNode {
    pub node: Node<SimRadio>,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimStats {
    pub elapsed_ms: u64,
    pub frames_sent: u64,
    pub tag_measurements: u64,
    pub anchor_measurements: u64,
    pub failed_sessions: u64,
    pub scan_cycles: u64,
}

pub struct SimNetwork {
    nodes: Vec<SimNode>,
    tag: usize,
    air: Air,
    bridge: HostBridge,
    scenario: ScenarioConfig,
    now_ms: u64,
    stats: SimStats,
}

impl SimNetwork {
    pub fn new(cfg: &SimConfig) -> Result<Self, SimError> {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let node_config = |address: NodeAddress| NodeConfig {
            address,
            timing: cfg.timing.clone(),
            twr_mode: cfg.twr_mode,
            anchor_count: cfg.anchor_count,
            seed: cfg.seed ^ (u64::from(address.raw()) << 16),
        };

        let mut nodes = Vec::with_capacity(cfg.anchors.len() + 1);
        let tag_addr = cfg.tag.tag_address();
        nodes.push(SimNode {
            node: Node::new(node_config(tag_addr), SimRadio::new(NodeClock::random(&cfg.air, &mut rng)), 0),
            position: cfg.tag.position,
        });
        for spec in &cfg.anchors {
            let addr = spec.anchor_address();
            if nodes.iter().any(|n| n.node.address().base_id() == addr.base_id() && !n.node.is_tag()) {
                return Err(SimError::DuplicateAnchor(spec.id));
            }
            nodes.push(SimNode {
                node: Node::new(node_config(addr), SimRadio::new(NodeClock::random(&cfg.air, &mut rng)), 0),
                position: spec.position,
            });
        }

        info!("Simulated network: {} + {} anchors ({:?})", tag_addr, cfg.anchors.len(), cfg.twr_mode);
        Ok(Self {
            nodes,
            tag: 0,
            air: Air::new(cfg.air.clone(), cfg.seed.wrapping_add(1))?,
            bridge: HostBridge::new(cfg.anchor_count),
            scenario: cfg.scenario.clone(),
            now_ms: 0,
            stats: SimStats::default(),
        })
    }

    pub fn now_ms(&self) -> u64 { self.now_ms }
    pub fn stats(&self) -> SimStats { SimStats { elapsed_ms: self.now_ms, ..self.stats } }
    pub fn tag(&self) -> &Node<SimRadio> { &self.nodes[self.tag].node }
    pub fn tag_position(&self) -> Vec3 { self.nodes[self.tag].position }

    pub fn set_tag_position(&mut self, position: Vec3) {
        self.nodes[self.tag].position = position;
    }

    /// The anchor deployment as the host would read it from its anchors file
    pub fn anchor_config(&self) -> Result<AnchorConfig, SimError> {
        let entries = self
            .nodes
            .iter()
            .filter(|n| n.node.address().is_anchor())
            .map(|n| AnchorEntry { id: n.node.address().raw(), position: n.position })
            .collect();
        Ok(AnchorConfig::new(entries)?)
    }

    /// Serve one host command byte through the tag's bridge
    pub fn host_request(&mut self, command: u8) -> Vec<u8> {
        let now_ms = self.now_ms;
        let sim_node = &mut self.nodes[self.tag];
        sim_node.node.radio_mut().now_s = now_ms as f64 / 1000.0;
        let reply = self.bridge.handle(&mut sim_node.node, now_ms, command);
        self.flush_outboxes();
        reply
    }

    pub fn run_for(&mut self, ms: u64) -> Vec<(NodeAddress, NodeEvent)> {
        let mut events = Vec::new();
        for _ in 0..ms {
            events.extend(self.tick());
        }
        events
    }

    pub fn tick(&mut self) -> Vec<(NodeAddress, NodeEvent)> {
        self.now_ms += 1;
        let now_ms = self.now_ms;
        let now_s = now_ms as f64 / 1000.0;

        self.apply_scenario(now_ms);

        let noise_scale = self.scenario.noise_scale();
        for arrival in self.air.due(now_s) {
            let receiver = &self.nodes[arrival.to].node;
            if !receiver.radio().online {
                continue;
            }
            let clock = receiver.radio().clock;
            let rx_time = self.air.rx_timestamp(&clock, arrival.arrival_s, noise_scale);
            receiver.rx_queue().push(RxFrame { bytes: arrival.bytes, rx_time });
        }

        let mut events = Vec::new();
        for sim_node in &mut self.nodes {
            sim_node.node.radio_mut().now_s = now_s;
            let address = sim_node.node.address();
            for event in sim_node.node.step(now_ms) {
                self.stats.record(&event, address.is_tag());
                events.push((address, event));
            }
        }
        self.flush_outboxes();
        events
    }

    fn apply_scenario(&mut self, now_ms: u64) {
        for sim_node in self.nodes.iter_mut().filter(|n| n.node.address().is_anchor()) {
            let base_id = sim_node.node.address().base_id();
            let online = !self.scenario.is_anchor_dropped(base_id, now_ms);
            let radio = sim_node.node.radio_mut();
            if radio.online != online {
                debug!("anchor#{} {}", base_id, if online { "back online" } else { "dropped out" });
                radio.online = online;
            }
            if let Some(step_s) = self.scenario.clock_slip(base_id, now_ms) {
                debug!("anchor#{} clock slips by {} s", base_id, step_s);
                radio.clock.offset_s += step_s;
            }
        }
    }

    fn flush_outboxes(&mut self) {
        let positions: Vec<Vec3> = self.nodes.iter().map(|n| n.position).collect();
        for (from, sim_node) in self.nodes.iter_mut().enumerate() {
            for tx in sim_node.node.radio_mut().take_outbox() {
                self.stats.frames_sent += 1;
                self.air.propagate(from, &positions, tx);
            }
        }
    }
}

impl SimStats {
    fn record(&mut self, event: &NodeEvent, from_tag: bool) {
        match event {
            NodeEvent::Measurement(_) if from_tag => self.tag_measurements += 1,
            NodeEvent::Measurement(_) => self.anchor_measurements += 1,
            NodeEvent::SessionFailed { .. } => self.failed_sessions += 1,
            NodeEvent::CycleComplete { .. } => self.scan_cycles += 1,
            NodeEvent::StateChanged { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uwb_types::wire::Command;
    use crate::twr::TwrMode;

    fn run_cycle(net: &mut SimNetwork) -> Vec<(NodeAddress, NodeEvent)> {
        net.host_request(Command::Scan as u8);
        net.run_for(400)
    }

    fn tag_ranges(events: &[(NodeAddress, NodeEvent)]) -> Vec<(u16, f32)> {
        events
            .iter()
            .filter(|(addr, _)| addr.is_tag())
            .filter_map(|(_, e)| match e {
                NodeEvent::Measurement(m) => Some((m.anchor.base_id(), m.distance_m)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_one_cycle_ranges_every_anchor() {
        let cfg = SimConfig::load(None).unwrap();
        let mut net = SimNetwork::new(&cfg).unwrap();
        let events = run_cycle(&mut net);

        let tag = net.tag_position();
        let mut ranges = tag_ranges(&events);
        ranges.sort_by_key(|(id, _)| *id);
        assert_eq!(ranges.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        for ((_, d), spec) in ranges.iter().zip(&cfg.anchors) {
            let truth = spec.position.dist(&tag);
            assert!((f64::from(*d) - truth).abs() < 0.15, "anchor {} range {d} vs {truth}", spec.id);
        }
        assert!(!net.tag().cycle_open());
        assert_eq!(net.tag().measurements().valid_count(), 5);
    }

    #[test]
    fn test_same_seed_same_events() {
        let cfg = SimConfig::load(None).unwrap();
        let mut a = SimNetwork::new(&cfg).unwrap();
        let mut b = SimNetwork::new(&cfg).unwrap();
        assert_eq!(run_cycle(&mut a), run_cycle(&mut b));
        assert_eq!(a.stats(), b.stats());
    }

    #[test]
    fn test_single_sided_suffers_from_drift() {
        let mut cfg = SimConfig::load(None).unwrap();
        cfg.air.timestamp_sigma_m = 0.0;
        let truth: Vec<f64> = cfg.anchors.iter().map(|a| a.position.dist(&cfg.tag.position)).collect();
        let worst = |cfg: &SimConfig| {
            let mut net = SimNetwork::new(cfg).unwrap();
            let mut ranges = tag_ranges(&run_cycle(&mut net));
            ranges.sort_by_key(|(id, _)| *id);
            ranges
                .iter()
                .zip(&truth)
                .map(|((_, d), t)| (f64::from(*d) - t).abs())
                .fold(0.0, f64::max)
        };

        assert!(worst(&cfg) < 0.01);
        cfg.twr_mode = TwrMode::SingleSided;
        assert!(worst(&cfg) > 0.1);
    }

    #[test]
    fn test_dropped_anchor_is_missing_from_table() {
        let mut cfg = SimConfig::load(None).unwrap();
        cfg.scenario = super::super::scenarios::preset_anchor_dropout();
        let mut net = SimNetwork::new(&cfg).unwrap();
        net.run_for(10);
        run_cycle(&mut net);
        let anchors: Vec<u16> = net.tag().measurements().valid().map(|m| m.anchor.base_id()).collect();
        assert_eq!(anchors.len(), 4);
        assert!(!anchors.contains(&2));
    }
}
