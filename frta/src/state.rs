//! Protocol state store.
//!
//! A pure in-memory container for the route cache, per-node trust values,
//! and per-node activity flags. No background behavior: all mutation comes
//! from message handlers and timers on the owning node.

use std::net::Ipv4Addr;

use hashbrown::HashMap;

use crate::time::Timestamp;
use crate::types::{RouteEntry, DEFAULT_TRUST};

/// In-memory protocol state: routes, trust, node activity.
#[derive(Debug, Default)]
pub struct FrtaState {
    routes: HashMap<Ipv4Addr, RouteEntry>,
    trust_values: HashMap<Ipv4Addr, f64>,
    node_states: HashMap<Ipv4Addr, bool>,
    last_update: Timestamp,
}

impl FrtaState {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the route for a destination.
    pub fn add_route(&mut self, destination: Ipv4Addr, entry: RouteEntry) {
        self.routes.insert(destination, entry);
    }

    /// Remove the route for a destination, if present.
    pub fn remove_route(&mut self, destination: Ipv4Addr) {
        self.routes.remove(&destination);
    }

    /// Look up the route for a destination.
    pub fn get_route(&self, destination: Ipv4Addr) -> Option<&RouteEntry> {
        self.routes.get(&destination)
    }

    /// Iterate over all cached routes.
    pub fn routes(&self) -> impl Iterator<Item = (&Ipv4Addr, &RouteEntry)> {
        self.routes.iter()
    }

    /// Destinations with a cached route.
    pub fn destinations(&self) -> impl Iterator<Item = &Ipv4Addr> {
        self.routes.keys()
    }

    /// Number of cached routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Set a node's trust value, clamped into [0, 1].
    pub fn update_trust(&mut self, node: Ipv4Addr, trust: f64) {
        self.trust_values.insert(node, trust.clamp(0.0, 1.0));
    }

    /// Get a node's trust value; unknown peers default to 0.5.
    pub fn get_trust(&self, node: Ipv4Addr) -> f64 {
        self.trust_values
            .get(&node)
            .copied()
            .unwrap_or(DEFAULT_TRUST)
    }

    /// Mark a node active or inactive.
    pub fn set_node_active(&mut self, node: Ipv4Addr, active: bool) {
        self.node_states.insert(node, active);
    }

    /// Whether a node is known to be active.
    pub fn is_node_active(&self, node: Ipv4Addr) -> bool {
        self.node_states.get(&node).copied().unwrap_or(false)
    }

    /// All nodes currently marked active.
    pub fn get_active_nodes(&self) -> Vec<Ipv4Addr> {
        self.node_states
            .iter()
            .filter(|(_, &active)| active)
            .map(|(&node, _)| node)
            .collect()
    }

    /// Record the time of the most recent store mutation from a handler.
    pub fn touch(&mut self, now: Timestamp) {
        self.last_update = now;
    }

    /// Time of the most recent store mutation.
    pub fn last_update(&self) -> Timestamp {
        self.last_update
    }

    /// Drop all routes, trust values, and activity flags.
    pub fn clear(&mut self) {
        self.routes.clear();
        self.trust_values.clear();
        self.node_states.clear();
    }
}
