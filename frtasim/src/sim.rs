//! Discrete event simulator for the FRTA protocol.

use std::collections::BinaryHeap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use frta::{Duration, InboundDecision, ProtocolConfig, TimerEvent, Timestamp, TraceEvent};
use hashbrown::HashMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::event::{ScenarioAction, ScheduledEvent, SequenceNumber, SimEvent};
use crate::metrics::{RouteSnapshot, SimMetrics, SimulationResult};
use crate::node::{PrintSink, SimNode, VecSink};
use crate::topology::Topology;

/// Application datagrams stop being forwarded past this many hops.
const APP_HOP_LIMIT: u32 = 32;

/// Discrete event simulator for FRTA networks.
///
/// The main loop pops the earliest event, advances simulation time, calls
/// the owning node's handler, then drains the node's outgoing datagrams
/// (routing them through the topology) and requested timers (feeding the
/// event heap). Same-time events are processed in scheduling order.
pub struct Simulator {
    /// All nodes in the simulation, keyed by address.
    nodes: HashMap<Ipv4Addr, SimNode>,
    /// Network topology.
    topology: Topology,
    /// Current simulation time.
    current_time: Timestamp,
    /// Priority queue of scheduled events.
    event_queue: BinaryHeap<ScheduledEvent>,
    /// Collected metrics.
    metrics: SimMetrics,
    /// Next sequence number for event ordering.
    next_seq: u64,
    /// Base seed for node RNGs.
    seed: u64,
    /// RNG for packet loss sampling.
    rng: SmallRng,
    /// Protocol configuration applied to new nodes.
    node_config: ProtocolConfig,
    /// Interval for automatic snapshots.
    snapshot_interval: Option<Duration>,
    /// Next snapshot time.
    next_snapshot: Option<Timestamp>,
    /// Per-node trace collection (when enabled).
    node_traces: HashMap<Ipv4Addr, Arc<Mutex<Vec<TraceEvent>>>>,
    /// Collect per-node traces for nodes added after this is set.
    collect_traces: bool,
    /// Print trace events to stderr as they occur.
    print_traces: bool,
}

impl Simulator {
    /// Create a new simulator with the given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            node_config: ProtocolConfig::default(),
            snapshot_interval: None,
            next_snapshot: None,
            node_traces: HashMap::new(),
            collect_traces: false,
            print_traces: false,
        }
    }

    /// Set the network topology.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the protocol configuration applied to nodes added afterwards.
    pub fn with_node_config(mut self, config: ProtocolConfig) -> Self {
        self.node_config = config;
        self
    }

    /// Set the snapshot interval for automatic route-cache recording.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Collect trace events per node. Must be set before adding nodes.
    /// Retrieve with [`take_node_traces`](Self::take_node_traces).
    pub fn with_collected_traces(mut self) -> Self {
        self.collect_traces = true;
        self
    }

    /// Print trace events to stderr as they occur.
    /// Must be set before adding nodes.
    pub fn with_printed_traces(mut self) -> Self {
        self.print_traces = true;
        self
    }

    /// Add a started node at the given address.
    pub fn add_node(&mut self, address: Ipv4Addr) {
        let node_seed = self.seed ^ u64::from(u32::from(address));
        let mut node = SimNode::new(address, node_seed, self.node_config, self.current_time);

        if self.print_traces {
            node.set_trace_sink(Box::new(PrintSink::new(address)));
        } else if self.collect_traces {
            let events = Arc::new(Mutex::new(Vec::new()));
            self.node_traces.insert(address, events.clone());
            node.set_trace_sink(Box::new(VecSink::new(events)));
        }

        node.start(self.current_time);
        self.nodes.insert(address, node);

        // Route the initial trust broadcast and arm the periodic timers.
        self.collect(address);
    }

    /// Take collected trace events for a node.
    /// Empty if trace collection was not enabled or the node is unknown.
    pub fn take_node_traces(&self, address: Ipv4Addr) -> Vec<TraceEvent> {
        self.node_traces
            .get(&address)
            .map(|events| std::mem::take(&mut *events.lock().unwrap()))
            .unwrap_or_default()
    }

    /// Get a reference to a node.
    pub fn node(&self, address: Ipv4Addr) -> Option<&SimNode> {
        self.nodes.get(&address)
    }

    /// Get a mutable reference to a node.
    pub fn node_mut(&mut self, address: Ipv4Addr) -> Option<&mut SimNode> {
        self.nodes.get_mut(&address)
    }

    /// All node addresses, in order.
    pub fn node_addresses(&self) -> Vec<Ipv4Addr> {
        let mut addrs: Vec<Ipv4Addr> = self.nodes.keys().copied().collect();
        addrs.sort();
        addrs
    }

    /// Get the current simulation time.
    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    /// Get the topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Get mutable topology.
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Get collected metrics.
    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Schedule an event.
    pub fn schedule(&mut self, time: Timestamp, event: SimEvent) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Schedule a scenario action.
    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, SimEvent::Action(action));
    }

    /// Schedule an application datagram from `from` toward `dest`.
    pub fn send_app_datagram(&mut self, time: Timestamp, from: Ipv4Addr, dest: Ipv4Addr) {
        self.schedule(time, SimEvent::AppSend { from, dest });
    }

    /// Run the simulation until the specified time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while let Some(event) = self.event_queue.peek() {
            if event.time > end_time {
                break;
            }

            let event = self.event_queue.pop().expect("peeked event");
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        // Advance to end_time even if no more events.
        self.advance_time(end_time);
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.peek().is_none(),
        }
    }

    /// Run the simulation for the specified duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    /// Advance simulation time.
    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    /// Process a single event.
    fn process_event(&mut self, event: SimEvent) {
        match event {
            SimEvent::ControlDelivery { to, data, from } => {
                self.deliver_control(to, data, from);
            }
            SimEvent::Timer { node, event } => {
                self.fire_timer(node, event);
            }
            SimEvent::AppSend { from, dest } => {
                self.app_send(from, dest);
            }
            SimEvent::AppDelivery {
                to,
                dest,
                from,
                hops,
            } => {
                self.app_delivery(to, dest, from, hops);
            }
            SimEvent::Action(action) => {
                self.execute_action(action);
            }
        }
    }

    /// Deliver a control datagram to a node.
    fn deliver_control(&mut self, to: Ipv4Addr, data: Vec<u8>, from: Ipv4Addr) {
        let now = self.current_time;

        if let Some(node) = self.nodes.get_mut(&to) {
            // The receiver observed a successful transmission from the sender.
            node.inner_mut()
                .collision_detector()
                .update_transmission(from, true, now);
            node.deliver(&data, from, now);
            self.metrics.datagrams_delivered += 1;
        }
        self.collect(to);
    }

    /// Fire a protocol timer at a node.
    fn fire_timer(&mut self, address: Ipv4Addr, event: TimerEvent) {
        let now = self.current_time;

        if let Some(node) = self.nodes.get_mut(&address) {
            node.fire_timer(event, now);
        }
        self.collect(address);
    }

    /// Handle an application send: route lookup, then first-hop delivery.
    fn app_send(&mut self, from: Ipv4Addr, dest: Ipv4Addr) {
        let now = self.current_time;
        self.metrics.app_sent += 1;

        let outcome = self
            .nodes
            .get_mut(&from)
            .map(|node| node.route_output(dest, now));

        match outcome {
            Some(Ok(_)) if dest.is_broadcast() => {
                // Broadcast datagrams go to every neighbor directly.
                for neighbor in self.topology.neighbors(from) {
                    self.forward_app(from, neighbor, dest, 1);
                }
            }
            Some(Ok(route)) => {
                self.forward_app(from, route.gateway, dest, 1);
            }
            Some(Err(_)) => {
                // No route; discovery was triggered inside route_output.
                self.metrics.app_no_route += 1;
            }
            None => {}
        }

        self.collect(from);
    }

    /// Handle an application datagram arriving at `to`.
    fn app_delivery(&mut self, to: Ipv4Addr, dest: Ipv4Addr, from: Ipv4Addr, hops: u32) {
        let now = self.current_time;

        let decision = match self.nodes.get_mut(&to) {
            Some(node) => {
                node.inner_mut()
                    .collision_detector()
                    .update_transmission(from, true, now);
                node.route_input(dest, now)
            }
            None => return,
        };

        match decision {
            InboundDecision::DeliverLocal => {
                self.metrics.app_delivered += 1;
            }
            InboundDecision::Forward(route) => {
                if hops >= APP_HOP_LIMIT {
                    self.metrics.app_dropped += 1;
                } else {
                    self.forward_app(to, route.gateway, dest, hops + 1);
                }
            }
            InboundDecision::NoRoute => {
                self.metrics.app_dropped += 1;
            }
        }

        self.collect(to);
    }

    /// Send an application datagram over one link, sampling loss.
    fn forward_app(&mut self, sender: Ipv4Addr, receiver: Ipv4Addr, dest: Ipv4Addr, hops: u32) {
        match self.sample_link(sender, receiver) {
            Some(delay) => {
                let at = self.current_time + delay;
                self.schedule(
                    at,
                    SimEvent::AppDelivery {
                        to: receiver,
                        dest,
                        from: sender,
                        hops,
                    },
                );
            }
            None => {
                self.metrics.app_dropped += 1;
            }
        }
    }

    /// Drain a node's outgoing datagrams and requested timers.
    fn collect(&mut self, address: Ipv4Addr) {
        let (outgoing, timers) = match self.nodes.get_mut(&address) {
            Some(node) => (node.take_outgoing(), node.take_timers()),
            None => return,
        };

        for (dest, data) in outgoing {
            self.route_datagram(address, dest, data);
        }
        for (at, event) in timers {
            self.schedule(
                at,
                SimEvent::Timer {
                    node: address,
                    event,
                },
            );
        }
    }

    /// Route a control datagram from `sender` through the topology.
    fn route_datagram(&mut self, sender: Ipv4Addr, dest: Ipv4Addr, data: Vec<u8>) {
        self.metrics.datagrams_sent += 1;

        if dest.is_broadcast() {
            for neighbor in self.topology.neighbors(sender) {
                if let Some(delay) = self.sample_link(sender, neighbor) {
                    let at = self.current_time + delay;
                    self.schedule(
                        at,
                        SimEvent::ControlDelivery {
                            to: neighbor,
                            data: data.clone(),
                            from: sender,
                        },
                    );
                }
            }
        } else {
            match self.sample_link(sender, dest) {
                Some(delay) => {
                    let at = self.current_time + delay;
                    self.schedule(
                        at,
                        SimEvent::ControlDelivery {
                            to: dest,
                            data,
                            from: sender,
                        },
                    );
                }
                None => {}
            }
        }
    }

    /// Sample one link transmission.
    ///
    /// Returns the link delay on success. On a sampled loss (or a missing
    /// or inactive link) the datagram is counted dropped, and the intended
    /// receiver's collision detector observes the failed transmission.
    fn sample_link(&mut self, sender: Ipv4Addr, receiver: Ipv4Addr) -> Option<Duration> {
        let now = self.current_time;

        let Some(link) = self.topology.get_link(sender, receiver) else {
            self.metrics.datagrams_dropped += 1;
            return None;
        };
        if !link.active {
            self.metrics.datagrams_dropped += 1;
            return None;
        }

        let loss_rate = link.loss_rate;
        let delay = link.delay;

        if loss_rate > 0.0 && self.rng.gen::<f64>() < loss_rate {
            trace!(%sender, %receiver, "datagram lost on link");
            self.metrics.datagrams_dropped += 1;
            if let Some(node) = self.nodes.get_mut(&receiver) {
                let detector = node.inner_mut().collision_detector();
                detector.record_link_collision(sender, receiver);
                detector.update_transmission(sender, false, now);
            }
            return None;
        }

        Some(delay)
    }

    /// Execute a scenario action.
    fn execute_action(&mut self, action: ScenarioAction) {
        debug!(time_us = self.current_time.as_micros(), ?action, "scenario action");
        match action {
            ScenarioAction::Partition { groups } => {
                self.topology.partition(&groups);
            }
            ScenarioAction::HealPartition => {
                self.topology.heal();
            }
            ScenarioAction::DisableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { a, b, rate } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::TakeSnapshot => {
                self.take_snapshot();
            }
        }
    }

    /// Check if we should take a snapshot and do so.
    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if self.current_time >= next {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    /// Record every node's fresh route-cache destinations.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = RouteSnapshot::new(self.current_time);

        for (&address, node) in &self.nodes {
            snapshot.record_node(address, node.fresh_destinations(self.current_time));
        }

        self.metrics.add_snapshot(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Link;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, 1, last)
    }

    #[test]
    fn test_simulator_creation() {
        let sim = Simulator::new(42);
        assert_eq!(sim.current_time(), Timestamp::ZERO);
        assert!(sim.node_addresses().is_empty());
    }

    #[test]
    fn test_add_nodes() {
        let topo = Topology::fully_connected(&[addr(1), addr(2)]);
        let mut sim = Simulator::new(42).with_topology(topo);
        sim.add_node(addr(1));
        sim.add_node(addr(2));

        assert_eq!(sim.node_addresses(), vec![addr(1), addr(2)]);
        assert!(sim.node(addr(1)).is_some());
    }

    #[test]
    fn test_startup_trust_broadcast_delivered() {
        let topo = Topology::fully_connected(&[addr(1), addr(2)]);
        let mut sim = Simulator::new(42).with_topology(topo);
        sim.add_node(addr(1));
        sim.add_node(addr(2));

        sim.run_for(Duration::from_secs(1));

        // Each node's startup trust broadcast reached the other:
        // trust folds 0.7*1.0 + 0.3*0.5 = 0.85.
        let at_two = sim.node(addr(2)).unwrap().inner().state().get_trust(addr(1));
        assert!((at_two - 0.85).abs() < 1e-12);
        let at_one = sim.node(addr(1)).unwrap().inner().state().get_trust(addr(2));
        assert!((at_one - 0.85).abs() < 1e-12);
        assert!(sim.metrics().datagrams_delivered >= 2);
    }

    #[test]
    fn test_inactive_link_drops_datagrams() {
        let mut topo = Topology::new();
        topo.add_link(addr(1), addr(2), Link::new().with_active(false));
        let mut sim = Simulator::new(42).with_topology(topo);
        sim.add_node(addr(1));
        sim.add_node(addr(2));

        sim.run_for(Duration::from_secs(1));

        assert_eq!(sim.metrics().datagrams_delivered, 0);
        assert!(sim.metrics().datagrams_dropped > 0);
    }

    #[test]
    fn test_full_loss_feeds_collision_detector() {
        let mut topo = Topology::fully_connected(&[addr(1), addr(2)]);
        topo.set_global_loss_rate(1.0);
        let mut sim = Simulator::new(42).with_topology(topo);
        sim.add_node(addr(1));
        sim.add_node(addr(2));

        sim.run_for(Duration::from_secs(1));

        assert_eq!(sim.metrics().datagrams_delivered, 0);
        // Node 2's startup broadcast was lost on the link toward node 1,
        // which observed the failed transmission.
        let node = sim.node_mut(addr(1)).unwrap();
        let detector = node.inner_mut().collision_detector();
        assert!(detector.link_collisions(addr(2), addr(1)) > 0);
        assert!(detector.global_collision_probability() > 0.0);
    }

    #[test]
    fn test_scenario_action_partitions() {
        let topo = Topology::fully_connected(&[addr(1), addr(2)]);
        let mut sim = Simulator::new(42).with_topology(topo);
        sim.add_node(addr(1));
        sim.add_node(addr(2));

        sim.schedule_action(
            Timestamp::from_millis(500),
            ScenarioAction::Partition {
                groups: vec![vec![addr(1)], vec![addr(2)]],
            },
        );
        sim.run_for(Duration::from_secs(1));

        assert!(!sim.topology().is_connected(addr(1), addr(2)));
    }

    #[test]
    fn test_app_datagram_needs_discovery_first() {
        let topo = Topology::fully_connected(&[addr(1), addr(2)]);
        let mut sim = Simulator::new(42).with_topology(topo);
        sim.add_node(addr(1));
        sim.add_node(addr(2));

        sim.send_app_datagram(Timestamp::from_millis(10), addr(1), addr(2));
        sim.run_for(Duration::from_secs(1));

        // First datagram found no route and kicked off discovery.
        assert_eq!(sim.metrics().app_no_route, 1);
        assert!(sim.node(addr(1)).unwrap().inner().malformed_count() == 0);
    }
}
