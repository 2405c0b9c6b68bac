//! Metrics collection for simulation analysis.

use std::net::Ipv4Addr;

use frta::Timestamp;
use hashbrown::HashMap;

/// A snapshot of every node's fresh route-cache destinations.
#[derive(Debug, Clone)]
pub struct RouteSnapshot {
    /// When this snapshot was taken.
    pub time: Timestamp,
    /// Fresh destinations per node.
    pub routes: HashMap<Ipv4Addr, Vec<Ipv4Addr>>,
}

impl RouteSnapshot {
    /// Create a new empty snapshot.
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            routes: HashMap::new(),
        }
    }

    /// Record a node's fresh destinations.
    pub fn record_node(&mut self, node: Ipv4Addr, destinations: Vec<Ipv4Addr>) {
        self.routes.insert(node, destinations);
    }

    /// Whether `node` held a fresh route to `dest` at snapshot time.
    pub fn has_route(&self, node: Ipv4Addr, dest: Ipv4Addr) -> bool {
        self.routes
            .get(&node)
            .is_some_and(|dests| dests.contains(&dest))
    }

    /// Number of fresh routes held by `node`.
    pub fn route_count(&self, node: Ipv4Addr) -> usize {
        self.routes.get(&node).map(Vec::len).unwrap_or(0)
    }
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Control datagrams handed to the topology for routing.
    pub datagrams_sent: u64,
    /// Control datagrams lost to link loss or inactive links.
    pub datagrams_dropped: u64,
    /// Control datagrams delivered to a node.
    pub datagrams_delivered: u64,
    /// Application datagrams originated.
    pub app_sent: u64,
    /// Application datagrams delivered to their destination.
    pub app_delivered: u64,
    /// Application datagrams dropped (no route or hop limit).
    pub app_dropped: u64,
    /// Application sends that found no route and triggered discovery.
    pub app_no_route: u64,
    /// Route-cache snapshots taken at intervals.
    pub snapshots: Vec<RouteSnapshot>,
}

impl SimMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot.
    pub fn add_snapshot(&mut self, snapshot: RouteSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Get the latest snapshot.
    pub fn latest_snapshot(&self) -> Option<&RouteSnapshot> {
        self.snapshots.last()
    }

    /// First snapshot time at which `node` held a fresh route to `dest`.
    pub fn first_route_time(&self, node: Ipv4Addr, dest: Ipv4Addr) -> Option<Timestamp> {
        self.snapshots
            .iter()
            .find(|s| s.has_route(node, dest))
            .map(|s| s.time)
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    /// Collected metrics.
    pub metrics: SimMetrics,
    /// Whether the event queue was drained (vs stopping at the time limit).
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// Whether `node` held a fresh route to `dest` at the end.
    pub fn has_route(&self, node: Ipv4Addr, dest: Ipv4Addr) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.has_route(node, dest))
    }
}
