//! Network topology and link properties.

use std::net::Ipv4Addr;

use frta::Duration;
use hashbrown::HashMap;

/// Properties of a network link between two nodes.
#[derive(Debug, Clone)]
pub struct Link {
    /// Packet loss rate (0.0 to 1.0).
    pub loss_rate: f64,
    /// Propagation delay.
    pub delay: Duration,
    /// Whether the link is currently active.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_micros(500),
            active: true,
        }
    }
}

impl Link {
    /// Create a new link with default properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loss rate.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set whether the link is active.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Network topology defining connectivity between nodes.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Links between pairs of nodes (bidirectional).
    links: HashMap<(Ipv4Addr, Ipv4Addr), Link>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fully connected topology for the given nodes.
    pub fn fully_connected(nodes: &[Ipv4Addr]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Create a chain topology (each node connected only to neighbors).
    pub fn chain(nodes: &[Ipv4Addr]) -> Self {
        let mut topo = Self::new();
        for window in nodes.windows(2) {
            topo.add_link(window[0], window[1], Link::default());
        }
        topo
    }

    /// Create a star topology (first node is hub, connected to all others).
    pub fn star(nodes: &[Ipv4Addr]) -> Self {
        let mut topo = Self::new();
        if nodes.is_empty() {
            return topo;
        }
        let hub = nodes[0];
        for &spoke in nodes.iter().skip(1) {
            topo.add_link(hub, spoke, Link::default());
        }
        topo
    }

    /// Add a bidirectional link between two nodes.
    pub fn add_link(&mut self, a: Ipv4Addr, b: Ipv4Addr, link: Link) {
        let (lo, hi) = Self::canonical_pair(a, b);
        self.links.insert((lo, hi), link);
    }

    /// Get a link between two nodes.
    pub fn get_link(&self, a: Ipv4Addr, b: Ipv4Addr) -> Option<&Link> {
        let (lo, hi) = Self::canonical_pair(a, b);
        self.links.get(&(lo, hi))
    }

    /// Get a mutable link between two nodes.
    pub fn get_link_mut(&mut self, a: Ipv4Addr, b: Ipv4Addr) -> Option<&mut Link> {
        let (lo, hi) = Self::canonical_pair(a, b);
        self.links.get_mut(&(lo, hi))
    }

    /// Check if two nodes are connected (link exists and is active).
    pub fn is_connected(&self, a: Ipv4Addr, b: Ipv4Addr) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// All nodes a given node can reach over active links, in address
    /// order for deterministic delivery scheduling.
    pub fn neighbors(&self, node: Ipv4Addr) -> Vec<Ipv4Addr> {
        let mut result = Vec::new();
        for (&(a, b), link) in &self.links {
            if link.active {
                if a == node {
                    result.push(b);
                } else if b == node {
                    result.push(a);
                }
            }
        }
        result.sort();
        result
    }

    /// Disable all links crossing between partition groups.
    pub fn partition(&mut self, groups: &[Vec<Ipv4Addr>]) {
        for (&(a, b), link) in self.links.iter_mut() {
            let a_group = groups.iter().position(|g| g.contains(&a));
            let b_group = groups.iter().position(|g| g.contains(&b));

            if a_group != b_group {
                link.active = false;
            }
        }
    }

    /// Re-enable all links (heal partitions).
    pub fn heal(&mut self) {
        for link in self.links.values_mut() {
            link.active = true;
        }
    }

    /// Set the loss rate on every link.
    pub fn set_global_loss_rate(&mut self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for link in self.links.values_mut() {
            link.loss_rate = rate;
        }
    }

    /// Set the delay on every link.
    pub fn set_global_delay(&mut self, delay: Duration) {
        for link in self.links.values_mut() {
            link.delay = delay;
        }
    }

    /// Canonical pair ordering for consistent link storage.
    fn canonical_pair(a: Ipv4Addr, b: Ipv4Addr) -> (Ipv4Addr, Ipv4Addr) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
