//! SimNode wrapper for simulated FRTA nodes.

use std::cell::Cell;
use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use frta::{
    Clock, Error, FrtaNode, InboundDecision, ProtocolConfig, Random, Route, TimerEvent,
    TraceEvent, TraceSink, Timestamp, Transport,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Trace sink that collects events into a shared Vec.
///
/// Uses `std::sync::Mutex`; intended for the simulator and tests, not for
/// real-time contexts.
pub struct VecSink {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl VecSink {
    pub fn new(events: Arc<Mutex<Vec<TraceEvent>>>) -> Self {
        Self { events }
    }
}

impl TraceSink for VecSink {
    fn emit(&mut self, event: TraceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Trace sink that prints events to stderr with node identification.
/// Events are printed immediately as they occur, giving chronological
/// output across nodes.
pub struct PrintSink {
    address: Ipv4Addr,
}

impl PrintSink {
    pub fn new(address: Ipv4Addr) -> Self {
        Self { address }
    }
}

impl TraceSink for PrintSink {
    fn emit(&mut self, event: TraceEvent) {
        eprintln!(
            "[{:>10}us] {}: {:?}",
            event.timestamp().as_micros(),
            self.address,
            event
        );
    }
}

/// Mock transport for simulation: records sends for the simulator to
/// route through the topology.
#[derive(Default)]
pub struct SimTransport {
    sent: Vec<(Ipv4Addr, Vec<u8>)>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all datagrams sent since the last call.
    pub fn take_sent(&mut self) -> Vec<(Ipv4Addr, Vec<u8>)> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for SimTransport {
    type Error = Infallible;

    fn send_to(&mut self, dest: Ipv4Addr, data: &[u8]) -> Result<(), Self::Error> {
        self.sent.push((dest, data.to_vec()));
        Ok(())
    }
}

/// Mock clock for simulation. Time is controlled by the simulator.
#[derive(Default)]
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        self.current.get()
    }
}

/// Seeded random source for simulated nodes.
pub struct SimRandom {
    rng: SmallRng,
}

impl SimRandom {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Random for SimRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..max)
    }
}

/// Type alias for simulated nodes.
pub type SimNodeInner = FrtaNode<SimTransport, SimRandom, SimClock>;

/// Wrapper around an FRTA node for simulation.
///
/// Keeps the node's clock synchronized with simulation time around every
/// handler call.
pub struct SimNode {
    inner: SimNodeInner,
    address: Ipv4Addr,
}

impl SimNode {
    /// Create a node at the given address with a deterministic RNG seed.
    pub fn new(address: Ipv4Addr, seed: u64, config: ProtocolConfig, created_at: Timestamp) -> Self {
        let inner = FrtaNode::new(
            SimTransport::new(),
            SimRandom::with_seed(seed),
            SimClock::at(created_at),
            vec![address],
            config,
        );

        Self { inner, address }
    }

    /// The node's address.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Get a reference to the inner protocol node.
    pub fn inner(&self) -> &SimNodeInner {
        &self.inner
    }

    /// Get a mutable reference to the inner protocol node.
    pub fn inner_mut(&mut self) -> &mut SimNodeInner {
        &mut self.inner
    }

    /// Replace the node's trace sink.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.inner.set_trace_sink(sink);
    }

    /// Start the protocol at the given simulation time.
    pub fn start(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.start();
    }

    /// Deliver a received control datagram.
    pub fn deliver(&mut self, data: &[u8], from: Ipv4Addr, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle_datagram(data, from);
    }

    /// Fire a protocol timer.
    pub fn fire_timer(&mut self, event: TimerEvent, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle_timer(event);
    }

    /// Route an outbound application datagram.
    pub fn route_output(&mut self, dest: Ipv4Addr, now: Timestamp) -> Result<Route, Error> {
        self.inner.clock().set(now);
        self.inner.route_output(dest)
    }

    /// Route an inbound application datagram.
    pub fn route_input(&mut self, dest: Ipv4Addr, now: Timestamp) -> InboundDecision {
        self.inner.clock().set(now);
        self.inner.route_input(dest)
    }

    /// Take all datagrams sent since the last call.
    pub fn take_outgoing(&mut self) -> Vec<(Ipv4Addr, Vec<u8>)> {
        self.inner.transport_mut().take_sent()
    }

    /// Take all timers requested since the last call.
    pub fn take_timers(&mut self) -> Vec<(Timestamp, TimerEvent)> {
        self.inner.take_timers()
    }

    /// Destinations the node currently holds a fresh route to.
    pub fn fresh_destinations(&self, now: Timestamp) -> Vec<Ipv4Addr> {
        let timeout = self.inner.config().cache_timeout;
        let mut dests: Vec<Ipv4Addr> = self
            .inner
            .state()
            .routes()
            .filter(|(_, entry)| entry.is_fresh(now, timeout))
            .map(|(&dest, _)| dest)
            .collect();
        dests.sort();
        dests
    }
}
