//! Scenario builder for setting up and running simulations.

use std::net::Ipv4Addr;

use frta::{Duration, ProtocolConfig};

use crate::sim::Simulator;
use crate::topology::Topology;

/// Type of topology to generate.
#[derive(Debug, Clone)]
enum TopologyType {
    /// Fully connected topology.
    FullyConnected,
    /// Chain topology (each node connected only to neighbors).
    Chain,
    /// Star topology (first node is hub).
    Star,
    /// Custom topology provided by the caller.
    Custom(Topology),
}

/// Builder for simulation scenarios.
///
/// Node addresses are assigned sequentially from a /24 base, matching the
/// example deployments (10.1.1.1, 10.1.1.2, ...).
pub struct ScenarioBuilder {
    /// Number of nodes to create.
    num_nodes: usize,
    /// First node address; subsequent nodes increment the last octet.
    base_address: Ipv4Addr,
    /// RNG seed for determinism.
    seed: u64,
    /// Topology type to generate (must be explicitly specified).
    topology_type: Option<TopologyType>,
    /// Global packet loss rate.
    loss_rate: f64,
    /// Link delay.
    delay: Duration,
    /// Protocol configuration for every node.
    config: ProtocolConfig,
    /// Snapshot interval.
    snapshot_interval: Option<Duration>,
}

impl ScenarioBuilder {
    /// Create a new scenario with the specified number of nodes.
    ///
    /// A topology must be specified before calling [`build`](Self::build):
    /// use `.fully_connected()`, `.chain_topology()`, `.star_topology()`,
    /// or `.topology(custom)`.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            base_address: Ipv4Addr::new(10, 1, 1, 1),
            seed: 42,
            topology_type: None,
            loss_rate: 0.0,
            delay: Duration::from_micros(500),
            config: ProtocolConfig::default(),
            snapshot_interval: None,
        }
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set a custom network topology.
    pub fn topology(mut self, topo: Topology) -> Self {
        self.topology_type = Some(TopologyType::Custom(topo));
        self
    }

    /// Use fully connected topology.
    pub fn fully_connected(mut self) -> Self {
        self.topology_type = Some(TopologyType::FullyConnected);
        self
    }

    /// Use chain topology (each node connected only to neighbors).
    pub fn chain_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Chain);
        self
    }

    /// Use star topology (first node is hub).
    pub fn star_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Star);
        self
    }

    /// Set global packet loss rate.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set link delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the protocol configuration applied to every node.
    pub fn with_config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the update interval for every node.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.config.update_interval = interval;
        self
    }

    /// Set snapshot interval for metrics collection.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Build the simulator and return it with the node addresses.
    pub fn build(self) -> (Simulator, Vec<Ipv4Addr>) {
        let base = u32::from(self.base_address);
        let addresses: Vec<Ipv4Addr> = (0..self.num_nodes as u32)
            .map(|i| Ipv4Addr::from(base + i))
            .collect();

        let mut topology = match self.topology_type.expect("topology must be specified") {
            TopologyType::FullyConnected => Topology::fully_connected(&addresses),
            TopologyType::Chain => Topology::chain(&addresses),
            TopologyType::Star => Topology::star(&addresses),
            TopologyType::Custom(topo) => topo,
        };
        topology.set_global_loss_rate(self.loss_rate);
        topology.set_global_delay(self.delay);

        let mut sim = Simulator::new(self.seed)
            .with_topology(topology)
            .with_node_config(self.config);
        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        for &address in &addresses {
            sim.add_node(address);
        }

        (sim, addresses)
    }
}
