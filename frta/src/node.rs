//! Node implementation - the main protocol state machine.
//!
//! `FrtaNode` holds all protocol state and is fully event-driven:
//! - Incoming control datagrams arrive via [`FrtaNode::handle_datagram`]
//! - Deferred work re-enters via [`FrtaNode::handle_timer`]
//! - Outbound application traffic is routed via the routing interface
//!
//! The node never blocks and owns no event loop. Each handler runs to
//! completion at the injected clock's current time, sending datagrams
//! through the injected [`Transport`] and pushing requested timers onto an
//! internal queue. The driver (an OS runtime or the simulator) keeps the
//! clock current, drains the queue with [`FrtaNode::take_timers`], and
//! calls back at each fire time.
//!
//! # Usage
//!
//! ```ignore
//! let mut node = FrtaNode::new(transport, random, clock, interfaces, config);
//! node.start();
//!
//! // Feed received control datagrams:
//! node.handle_datagram(&data, sender);
//!
//! // Arm requested timers, fire them when due:
//! for (at, event) in node.take_timers() {
//!     scheduler.schedule(at, event);
//! }
//! ```

use std::net::Ipv4Addr;

use hashbrown::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::collision::CollisionDetector;
use crate::config::ProtocolConfig;
use crate::state::FrtaState;
use crate::time::Timestamp;
use crate::trace::{NullSink, TraceEvent, TraceSink};
use crate::traits::{Clock, Random, Transport};
use crate::types::{RouteEntry, TimerEvent};
use crate::wire::{Decode, Encode, Message};

/// Enumerated candidate paths toward a destination, with the time the
/// enumeration was computed.
pub(crate) type CachedPaths = (Vec<Vec<Ipv4Addr>>, Timestamp);

/// The FRTA protocol state machine for one node.
///
/// Generic over:
/// - `T`: Transport implementation
/// - `R`: Random number generator
/// - `C`: Clock implementation
pub struct FrtaNode<T, R, C> {
    // Dependencies (injected)
    pub(crate) transport: T,
    pub(crate) random: R,
    pub(crate) clock: C,

    pub(crate) config: ProtocolConfig,

    /// Local interface addresses, loopback excluded.
    pub(crate) interfaces: Vec<Ipv4Addr>,

    /// Route cache, trust values, and activity flags.
    pub(crate) state: FrtaState,

    /// Destinations with an outstanding route request.
    pub(crate) pending_requests: HashSet<Ipv4Addr>,
    /// Origination time per outstanding request.
    pub(crate) route_request_time: HashMap<Ipv4Addr, Timestamp>,

    pub(crate) collision: CollisionDetector,

    /// Memoized path trust keyed by the exact address sequence.
    pub(crate) path_trust_cache: HashMap<Vec<Ipv4Addr>, f64>,
    /// Cached path enumerations per destination.
    pub(crate) cached_paths: HashMap<Ipv4Addr, CachedPaths>,

    /// Timers requested by handlers, drained by the driver.
    pub(crate) timers: Vec<(Timestamp, TimerEvent)>,

    pub(crate) sink: Box<dyn TraceSink>,

    /// Undecodable datagrams dropped so far.
    pub(crate) malformed_count: u64,

    pub(crate) running: bool,
}

impl<T, R, C> FrtaNode<T, R, C>
where
    T: Transport,
    R: Random,
    C: Clock,
{
    /// Create a node over the given seams and local interfaces.
    ///
    /// Loopback interfaces are ignored. The node starts stopped; call
    /// [`start`](Self::start).
    pub fn new(
        transport: T,
        random: R,
        clock: C,
        interfaces: Vec<Ipv4Addr>,
        config: ProtocolConfig,
    ) -> Self {
        let interfaces: Vec<Ipv4Addr> = interfaces
            .into_iter()
            .filter(|addr| !addr.is_loopback())
            .collect();

        Self {
            transport,
            random,
            clock,
            config,
            interfaces,
            state: FrtaState::new(),
            pending_requests: HashSet::new(),
            route_request_time: HashMap::new(),
            collision: CollisionDetector::new(),
            path_trust_cache: HashMap::new(),
            cached_paths: HashMap::new(),
            timers: Vec::new(),
            sink: Box::new(NullSink),
            malformed_count: 0,
            running: false,
        }
    }

    /// Replace the trace sink.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sink = sink;
    }

    /// Replace the trace sink, builder style.
    pub fn with_trace_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Start the protocol: install self routes, broadcast initial trust,
    /// and arm the periodic timers. Idempotent.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;

        let now = self.now();
        self.install_self_routes();
        self.emit(TraceEvent::Started { timestamp: now });

        // The first trust broadcast goes out immediately and re-arms itself.
        self.handle_trust_broadcast();
        self.schedule(now + self.config.update_interval, TimerEvent::Advertise);
        self.schedule(now + self.config.cache_timeout, TimerEvent::CacheSweep);
    }

    /// Stop the protocol and clear all per-node state.
    ///
    /// Periodic timers already armed observe the stopped flag when they
    /// fire and do not re-arm.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        self.state.clear();
        self.pending_requests.clear();
        self.route_request_time.clear();
        self.path_trust_cache.clear();
        self.cached_paths.clear();
        self.collision.clear();
        let now = self.now();
        self.emit(TraceEvent::Stopped { timestamp: now });
    }

    /// Change the period of routing updates and advertisements.
    ///
    /// Takes effect when the currently armed periodic timers fire.
    pub fn set_update_interval(&mut self, interval: crate::time::Duration) {
        self.config.update_interval = interval;
    }

    /// Whether the protocol is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The protocol state store.
    pub fn state(&self) -> &FrtaState {
        &self.state
    }

    /// The active configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// The collision detector.
    pub fn collision_detector(&mut self) -> &mut CollisionDetector {
        &mut self.collision
    }

    /// The injected clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The injected transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The injected transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The configured local interface addresses.
    pub fn interfaces(&self) -> &[Ipv4Addr] {
        &self.interfaces
    }

    /// The primary local address (first configured interface).
    pub fn local_address(&self) -> Ipv4Addr {
        self.interfaces
            .first()
            .copied()
            .unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    /// Whether the address belongs to one of the local interfaces.
    pub fn is_local(&self, addr: Ipv4Addr) -> bool {
        self.interfaces.contains(&addr)
    }

    /// Whether a route request is outstanding for this destination.
    pub fn has_pending_request(&self, dest: Ipv4Addr) -> bool {
        self.pending_requests.contains(&dest)
    }

    /// Undecodable datagrams dropped so far.
    pub fn malformed_count(&self) -> u64 {
        self.malformed_count
    }

    /// A newly reachable interface re-installs the self routes.
    pub fn notify_interface_up(&mut self) {
        self.install_self_routes();
    }

    /// An interface went away. Routes through it age out of the cache.
    pub fn notify_interface_down(&mut self) {
        debug!("interface down");
    }

    /// An address was added to a local interface.
    pub fn notify_add_address(&mut self, addr: Ipv4Addr) {
        if !addr.is_loopback() && !self.interfaces.contains(&addr) {
            self.interfaces.push(addr);
        }
        self.install_self_routes();
    }

    /// An address was removed from a local interface.
    pub fn notify_remove_address(&mut self, addr: Ipv4Addr) {
        self.interfaces.retain(|&a| a != addr);
        debug!(%addr, "address removed");
    }

    /// Drain the timers requested since the last call.
    ///
    /// Each element is an absolute fire time and the event to feed back
    /// into [`handle_timer`](Self::handle_timer).
    pub fn take_timers(&mut self) -> Vec<(Timestamp, TimerEvent)> {
        core::mem::take(&mut self.timers)
    }

    /// Process a received control datagram.
    pub fn handle_datagram(&mut self, data: &[u8], sender: Ipv4Addr) {
        if !self.running {
            return;
        }
        let now = self.now();

        let message = match Message::decode_from_slice(data) {
            Ok(message) => message,
            Err(err) => {
                self.malformed_count += 1;
                warn!(%sender, %err, "dropping malformed datagram");
                self.emit(TraceEvent::MalformedDatagram {
                    timestamp: now,
                    from: sender,
                });
                return;
            }
        };

        // Hearing from a peer at all marks it active.
        self.state.set_node_active(sender, true);
        self.state.touch(now);

        match message {
            Message::RouteRequest(request) => self.handle_request(request, sender),
            Message::RouteReply(reply) => self.handle_reply(reply, sender),
            Message::RouteAdvertisement(adv) => self.handle_advertisement(adv),
            Message::TrustUpdate(update) => {
                debug!(%sender, trust = update.trust, "trust update received");
                self.update_trust(sender, update.trust);
            }
        }
    }

    /// Process a fired timer.
    ///
    /// Timers whose trigger was satisfied in the meantime are no-ops.
    pub fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::RequestTimeout { dest } => self.handle_request_timeout(dest),
            TimerEvent::ForwardRequest { request } => {
                if self.running {
                    self.broadcast(&Message::RouteRequest(request));
                }
            }
            TimerEvent::SendReply { reply, next_hop } => {
                if self.running {
                    self.send_message(next_hop, &Message::RouteReply(reply));
                }
            }
            TimerEvent::TrustBroadcast => self.handle_trust_broadcast(),
            TimerEvent::Advertise => self.handle_advertise(),
            TimerEvent::CacheSweep => self.handle_cache_sweep(),
        }
    }

    /// Install a self route per local interface: the node reaches its own
    /// addresses in zero hops at full trust.
    pub(crate) fn install_self_routes(&mut self) {
        let now = self.now();
        for i in 0..self.interfaces.len() {
            let addr = self.interfaces[i];
            self.state
                .add_route(addr, RouteEntry::new(addr, 1.0, now, 0));
            self.state.update_trust(addr, 1.0);
        }
        self.state.touch(now);
    }

    /// The injected clock's current time.
    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Request a timer at an absolute fire time.
    pub(crate) fn schedule(&mut self, at: Timestamp, event: TimerEvent) {
        self.timers.push((at, event));
    }

    /// Emit a trace event to the sink.
    pub(crate) fn emit(&mut self, event: TraceEvent) {
        self.sink.emit(event);
    }

    /// Unicast a message.
    pub(crate) fn send_message(&mut self, dest: Ipv4Addr, message: &Message) {
        if let Err(err) = self.transport.send_to(dest, &message.encode_to_vec()) {
            warn!(%dest, ?err, "transport send failed");
        }
    }

    /// Broadcast a message to all neighbors.
    pub(crate) fn broadcast(&mut self, message: &Message) {
        self.send_message(Ipv4Addr::BROADCAST, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_impls::{MockClock, MockRandom, MockTransport};
    use crate::types::TrustUpdate;
    use crate::wire::TAG_TRUST_UPDATE;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, 1, last)
    }

    fn make_node(interfaces: Vec<Ipv4Addr>) -> FrtaNode<MockTransport, MockRandom, MockClock> {
        FrtaNode::new(
            MockTransport::new(),
            MockRandom::new(),
            MockClock::new(),
            interfaces,
            ProtocolConfig::default(),
        )
    }

    #[test]
    fn test_start_installs_self_routes() {
        let mut node = make_node(vec![addr(2)]);
        node.start();

        let entry = node.state().get_route(addr(2)).expect("self route");
        assert_eq!(entry.next_hop, addr(2));
        assert_eq!(entry.trust, 1.0);
        assert_eq!(entry.hop_count, 0);
        assert_eq!(node.state().get_trust(addr(2)), 1.0);
    }

    #[test]
    fn test_start_ignores_loopback() {
        let node = make_node(vec![Ipv4Addr::LOCALHOST, addr(2)]);
        assert_eq!(node.interfaces(), &[addr(2)]);
        assert_eq!(node.local_address(), addr(2));
    }

    #[test]
    fn test_start_broadcasts_trust_and_arms_timers() {
        let mut node = make_node(vec![addr(2)]);
        node.start();

        // One immediate trust broadcast for the single interface.
        let broadcasts = node.transport.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0][0], TAG_TRUST_UPDATE);

        let timers = node.take_timers();
        assert_eq!(timers.len(), 3);
        assert!(timers
            .iter()
            .any(|(at, e)| *e == TimerEvent::TrustBroadcast && at.as_secs() == 30));
        assert!(timers
            .iter()
            .any(|(at, e)| *e == TimerEvent::Advertise && at.as_secs() == 30));
        assert!(timers
            .iter()
            .any(|(at, e)| *e == TimerEvent::CacheSweep && at.as_secs() == 30));
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut node = make_node(vec![addr(2)]);
        node.start();
        let sent = node.transport.sent.len();
        node.clock().set(Timestamp::from_secs(1));
        node.start();
        assert_eq!(node.transport.sent.len(), sent);
    }

    #[test]
    fn test_stop_clears_state() {
        let mut node = make_node(vec![addr(2)]);
        node.start();
        node.clock().set(Timestamp::from_secs(1));
        node.handle_datagram(
            &Message::TrustUpdate(TrustUpdate { trust: 0.9 }).encode_to_vec(),
            addr(3),
        );
        assert!(node.state().is_node_active(addr(3)));

        node.clock().set(Timestamp::from_secs(2));
        node.stop();
        assert!(!node.is_running());
        assert_eq!(node.state().route_count(), 0);
        assert!(!node.state().is_node_active(addr(3)));
    }

    #[test]
    fn test_stopped_periodic_timer_does_not_rearm() {
        let mut node = make_node(vec![addr(2)]);
        node.start();
        node.take_timers();
        node.stop();

        node.clock().set(Timestamp::from_secs(30));
        node.handle_timer(TimerEvent::TrustBroadcast);
        assert!(node.take_timers().is_empty());
    }

    #[test]
    fn test_malformed_datagram_counted_and_dropped() {
        let mut node = make_node(vec![addr(2)]);
        node.start();

        node.handle_datagram(&[1, 2, 3], addr(3));
        assert_eq!(node.malformed_count(), 1);
        // The sender is not marked active on a malformed datagram.
        assert!(!node.state().is_node_active(addr(3)));
    }

    #[test]
    fn test_trust_update_folds_into_sender_trust() {
        let mut node = make_node(vec![addr(2)]);
        node.start();

        let bytes = Message::TrustUpdate(TrustUpdate { trust: 0.9 }).encode_to_vec();
        node.clock().set(Timestamp::from_secs(1));
        node.handle_datagram(&bytes, addr(3));

        // 0.7 * 0.9 + 0.3 * 0.5 = 0.78
        assert!((node.state().get_trust(addr(3)) - 0.78).abs() < 1e-12);
    }

    #[test]
    fn test_datagrams_dropped_while_stopped() {
        let mut node = make_node(vec![addr(2)]);
        let bytes = Message::TrustUpdate(TrustUpdate { trust: 0.9 }).encode_to_vec();
        node.handle_datagram(&bytes, addr(3));
        assert_eq!(node.state().get_trust(addr(3)), 0.5);
    }

    #[test]
    fn test_notify_add_address_installs_route() {
        let mut node = make_node(vec![addr(2)]);
        node.start();
        node.clock().set(Timestamp::from_secs(1));

        node.notify_add_address(addr(4));
        assert!(node.is_local(addr(4)));
        let entry = node.state().get_route(addr(4)).expect("self route");
        assert_eq!(entry.hop_count, 0);
        assert_eq!(entry.last_update, Timestamp::from_secs(1));

        node.notify_remove_address(addr(4));
        assert!(!node.is_local(addr(4)));
    }

    #[test]
    fn test_interface_up_refreshes_self_routes() {
        let mut node = make_node(vec![addr(2)]);
        node.start();
        node.clock().set(Timestamp::from_secs(10));
        node.notify_interface_up();
        assert_eq!(
            node.state().get_route(addr(2)).unwrap().last_update,
            Timestamp::from_secs(10)
        );
    }
}
