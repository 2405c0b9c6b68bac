//! Routing interface: outbound lookup, inbound forwarding, trusted paths.
//!
//! Outbound lookups serve broadcast destinations and fresh cache hits
//! synchronously and fall back to route discovery otherwise. Inbound
//! datagrams are delivered locally, forwarded along a fresh cache entry,
//! or dropped. The trusted-path API enumerates candidate paths over the
//! cache graph and ranks them by path trust; it is not on the forwarding
//! fast path.

use std::net::Ipv4Addr;

use hashbrown::HashSet;

use crate::node::FrtaNode;
use crate::traits::{Clock, Random, Transport};
use crate::types::{Error, InboundDecision, Route};

impl<T, R, C> FrtaNode<T, R, C>
where
    T: Transport,
    R: Random,
    C: Clock,
{
    /// Map an outbound datagram destination to a route.
    ///
    /// A cache miss triggers route discovery (unless one is already
    /// pending) and reports no route; the caller decides whether to retry
    /// on its next datagram.
    pub fn route_output(&mut self, destination: Ipv4Addr) -> Result<Route, Error> {
        if !self.running {
            return Err(Error::NotRunning);
        }

        if destination.is_broadcast() {
            return Ok(Route {
                destination,
                gateway: Ipv4Addr::UNSPECIFIED,
                source: self.local_address(),
            });
        }

        let now = self.now();
        if let Some(entry) = self.state.get_route(destination) {
            if entry.is_fresh(now, self.config.cache_timeout) {
                return Ok(Route {
                    destination,
                    gateway: entry.next_hop,
                    source: self.local_address(),
                });
            }
        }

        if !self.pending_requests.contains(&destination) {
            self.send_route_request(destination);
        }
        Err(Error::NoRoute(destination))
    }

    /// Decide what to do with a received datagram.
    ///
    /// Broadcast and locally addressed datagrams are delivered; others are
    /// forwarded along a fresh cache entry or dropped. A miss here does
    /// not trigger discovery.
    pub fn route_input(&mut self, destination: Ipv4Addr) -> InboundDecision {
        if destination.is_broadcast() || self.is_local(destination) {
            return InboundDecision::DeliverLocal;
        }

        let now = self.now();
        if let Some(entry) = self.state.get_route(destination) {
            if entry.is_fresh(now, self.config.cache_timeout) {
                return InboundDecision::Forward(Route {
                    destination,
                    gateway: entry.next_hop,
                    source: self.local_address(),
                });
            }
        }

        InboundDecision::NoRoute
    }

    /// Enumerate candidate paths from `source` to `destination` over the
    /// cache graph.
    ///
    /// Every cached destination counts as a neighbor of every node, so
    /// this explores orderings of cache keys. Exploration is a depth-first
    /// walk with a visited set, bounded by the path limit, and results are
    /// cached per destination for the cache-timeout window.
    pub fn find_all_paths(
        &mut self,
        source: Ipv4Addr,
        destination: Ipv4Addr,
    ) -> Vec<Vec<Ipv4Addr>> {
        let now = self.now();
        if let Some((paths, computed_at)) = self.cached_paths.get(&destination) {
            if now.saturating_sub(*computed_at) < self.config.cache_timeout {
                return paths.clone();
            }
        }

        // Ordered candidates give deterministic enumeration.
        let mut candidates: Vec<Ipv4Addr> = self.state.destinations().copied().collect();
        candidates.sort();

        let max_paths = self.config.max_paths;
        let mut paths: Vec<Vec<Ipv4Addr>> = Vec::new();
        let mut current_path: Vec<Ipv4Addr> = vec![source];
        let mut visited: HashSet<Ipv4Addr> = HashSet::from_iter([source]);
        // Each frame is (node, index of the next candidate to try).
        let mut stack: Vec<(Ipv4Addr, usize)> = vec![(source, 0)];

        while let Some(&mut (node, ref mut next_idx)) = stack.last_mut() {
            if paths.len() >= max_paths {
                break;
            }

            if node == destination {
                paths.push(current_path.clone());
                visited.remove(&node);
                current_path.pop();
                stack.pop();
                continue;
            }

            let mut descended = false;
            while *next_idx < candidates.len() {
                let next = candidates[*next_idx];
                *next_idx += 1;
                if visited.insert(next) {
                    current_path.push(next);
                    stack.push((next, 0));
                    descended = true;
                    break;
                }
            }

            if !descended {
                visited.remove(&node);
                current_path.pop();
                stack.pop();
            }
        }

        self.cached_paths.insert(destination, (paths.clone(), now));
        paths
    }

    /// Select the most trusted path from `source` to `destination`.
    ///
    /// A fresh direct cache entry short-circuits to
    /// `[source, next_hop, destination]`; otherwise the enumerated
    /// candidates are ranked by path trust. Empty when nothing is known.
    pub fn select_trusted_path(
        &mut self,
        source: Ipv4Addr,
        destination: Ipv4Addr,
    ) -> Vec<Ipv4Addr> {
        let now = self.now();
        if let Some(entry) = self.state.get_route(destination) {
            if entry.is_fresh(now, self.config.cache_timeout) {
                return vec![source, entry.next_hop, destination];
            }
        }

        let paths = self.find_all_paths(source, destination);
        let mut best_trust = -1.0f64;
        let mut best_path: Vec<Ipv4Addr> = Vec::new();

        for path in paths {
            let trust = self.path_trust(&path);
            if trust > best_trust {
                best_trust = trust;
                best_path = path;
            }
        }

        best_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::time::{Duration, Timestamp};
    use crate::traits::test_impls::{MockClock, MockRandom, MockTransport};
    use crate::types::{RouteEntry, ROUTE_CACHE_TIMEOUT};

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, 1, last)
    }

    fn make_node(local: Ipv4Addr) -> FrtaNode<MockTransport, MockRandom, MockClock> {
        let mut node = FrtaNode::new(
            MockTransport::new(),
            MockRandom::new(),
            MockClock::new(),
            vec![local],
            ProtocolConfig::default(),
        );
        node.start();
        node.transport.sent.clear();
        node.take_timers();
        node
    }

    #[test]
    fn test_route_output_requires_running() {
        let mut node = make_node(addr(1));
        node.stop();
        assert_eq!(node.route_output(addr(3)), Err(Error::NotRunning));
    }

    #[test]
    fn test_route_output_broadcast() {
        let mut node = make_node(addr(1));
        let route = node.route_output(Ipv4Addr::BROADCAST).unwrap();
        assert_eq!(route.gateway, Ipv4Addr::UNSPECIFIED);
        assert_eq!(route.source, addr(1));
    }

    #[test]
    fn test_route_output_fresh_hit() {
        let mut node = make_node(addr(1));
        let t0 = Timestamp::from_secs(1);
        node.state
            .add_route(addr(3), RouteEntry::new(addr(2), 0.8, t0, 1));

        node.clock().set(t0 + Duration::from_secs(5));
        let route = node.route_output(addr(3)).unwrap();
        assert_eq!(route.destination, addr(3));
        assert_eq!(route.gateway, addr(2));
        assert_eq!(route.source, addr(1));
        // No discovery was started.
        assert!(!node.has_pending_request(addr(3)));
    }

    #[test]
    fn test_route_output_miss_triggers_discovery_once() {
        let mut node = make_node(addr(1));
        node.clock().set(Timestamp::from_secs(1));

        assert_eq!(node.route_output(addr(9)), Err(Error::NoRoute(addr(9))));
        assert!(node.has_pending_request(addr(9)));
        assert_eq!(node.transport.broadcasts().len(), 1);

        // A second lookup while pending does not re-request.
        assert_eq!(node.route_output(addr(9)), Err(Error::NoRoute(addr(9))));
        assert_eq!(node.transport.broadcasts().len(), 1);
    }

    #[test]
    fn test_route_output_stale_entry_rediscovers() {
        let mut node = make_node(addr(1));
        let installed = Timestamp::from_secs(1);
        node.state
            .add_route(addr(3), RouteEntry::new(addr(2), 0.8, installed, 1));

        node.clock().set(installed + ROUTE_CACHE_TIMEOUT);
        assert_eq!(node.route_output(addr(3)), Err(Error::NoRoute(addr(3))));
        assert!(node.has_pending_request(addr(3)));
    }

    #[test]
    fn test_route_input_delivers_local_and_broadcast() {
        let mut node = make_node(addr(1));
        assert_eq!(
            node.route_input(Ipv4Addr::BROADCAST),
            InboundDecision::DeliverLocal
        );
        assert_eq!(node.route_input(addr(1)), InboundDecision::DeliverLocal);
    }

    #[test]
    fn test_route_input_forwards_fresh_entry() {
        let mut node = make_node(addr(1));
        let t0 = Timestamp::from_secs(1);
        node.clock().set(t0);
        node.state
            .add_route(addr(3), RouteEntry::new(addr(2), 0.8, t0, 1));

        match node.route_input(addr(3)) {
            InboundDecision::Forward(route) => {
                assert_eq!(route.gateway, addr(2));
                assert_eq!(route.source, addr(1));
            }
            other => panic!("expected forward, got {:?}", other),
        }
    }

    #[test]
    fn test_route_input_drops_without_route() {
        let mut node = make_node(addr(1));
        assert_eq!(node.route_input(addr(9)), InboundDecision::NoRoute);
        // Inbound misses never trigger discovery.
        assert!(!node.has_pending_request(addr(9)));
    }

    #[test]
    fn test_select_trusted_path_direct() {
        let mut node = make_node(addr(1));
        let t0 = Timestamp::from_secs(1);
        node.clock().set(t0);
        node.state
            .add_route(addr(3), RouteEntry::new(addr(2), 0.8, t0, 1));

        let path = node.select_trusted_path(addr(1), addr(3));
        assert_eq!(path, vec![addr(1), addr(2), addr(3)]);
    }

    #[test]
    fn test_find_all_paths_enumerates_cache_graph() {
        let mut node = make_node(addr(1));
        // Clear the self route so the candidate set is exactly {B, C}.
        node.state.remove_route(addr(1));
        let t0 = Timestamp::from_secs(1);
        node.clock().set(t0);
        node.state
            .add_route(addr(2), RouteEntry::new(addr(2), 0.8, t0, 1));
        node.state
            .add_route(addr(3), RouteEntry::new(addr(2), 0.8, t0, 1));

        let paths = node.find_all_paths(addr(1), addr(3));
        // Candidates in address order: B then C. Paths: A-B-C, then A-C.
        assert_eq!(
            paths,
            vec![vec![addr(1), addr(2), addr(3)], vec![addr(1), addr(3)]]
        );
    }

    #[test]
    fn test_find_all_paths_respects_limit() {
        let mut node = make_node(addr(1));
        node.state.remove_route(addr(1));
        let t0 = Timestamp::from_secs(1);
        node.clock().set(t0);
        for i in 2..=8 {
            node.state
                .add_route(addr(i), RouteEntry::new(addr(2), 0.8, t0, 1));
        }

        let paths = node.find_all_paths(addr(1), addr(8));
        assert_eq!(paths.len(), node.config.max_paths);
        for path in &paths {
            assert_eq!(path.first(), Some(&addr(1)));
            assert_eq!(path.last(), Some(&addr(8)));
        }
    }

    #[test]
    fn test_find_all_paths_cached_for_window() {
        let mut node = make_node(addr(1));
        node.state.remove_route(addr(1));
        let t0 = Timestamp::from_secs(1);
        node.clock().set(t0);
        node.state
            .add_route(addr(3), RouteEntry::new(addr(2), 0.8, t0, 1));

        let first = node.find_all_paths(addr(1), addr(3));
        assert_eq!(first.len(), 1);

        // Cache-graph changes are not visible through the cached window.
        node.state
            .add_route(addr(2), RouteEntry::new(addr(2), 0.8, t0, 1));
        node.clock().set(t0 + Duration::from_secs(5));
        let cached = node.find_all_paths(addr(1), addr(3));
        assert_eq!(cached, first);

        // Past the window the enumeration is recomputed.
        node.clock().set(t0 + ROUTE_CACHE_TIMEOUT);
        let recomputed = node.find_all_paths(addr(1), addr(3));
        assert_eq!(recomputed.len(), 2);
    }

    #[test]
    fn test_select_trusted_path_prefers_trustworthy_members() {
        let mut node = make_node(addr(1));
        node.state.remove_route(addr(1));
        let t0 = Timestamp::from_secs(1);

        node.state
            .add_route(addr(2), RouteEntry::new(addr(2), 0.8, t0, 1));
        node.state
            .add_route(addr(3), RouteEntry::new(addr(2), 0.8, t0, 1));
        node.state.update_trust(addr(1), 0.9);
        node.state.update_trust(addr(2), 0.2);
        node.state.update_trust(addr(3), 0.9);

        // Entries are stale at lookup time so the direct branch is skipped.
        node.clock().set(t0 + ROUTE_CACHE_TIMEOUT);
        let path = node.select_trusted_path(addr(1), addr(3));
        // A-C (min trust 0.9) beats A-B-C (min trust 0.2).
        assert_eq!(path, vec![addr(1), addr(3)]);
    }

    #[test]
    fn test_select_trusted_path_empty_when_unknown() {
        let mut node = make_node(addr(1));
        node.state.remove_route(addr(1));
        node.clock().set(Timestamp::from_secs(1));
        let path = node.select_trusted_path(addr(1), addr(9));
        assert!(path.is_empty());
    }
}
