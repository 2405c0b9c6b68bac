//! Core traits for transport, time, and randomness abstraction.
//!
//! These traits allow the protocol to run over different:
//! - Datagram transports (UDP sockets, simulated links)
//! - Clock sources (OS monotonic clock, simulated time)
//! - Random number generators
//!
//! The protocol never blocks: every send returns synchronously, and all
//! deferred work is expressed as [`TimerEvent`](crate::types::TimerEvent)s
//! the driver collects via `FrtaNode::take_timers` and feeds back at fire
//! time. The driver owns the event loop; the node owns the state.

use core::fmt::Debug;
use std::net::Ipv4Addr;

use crate::time::Timestamp;

/// Datagram transport for control traffic.
///
/// The protocol addresses peers by IPv4 address only; the embedding binds
/// the underlying socket to the control port
/// ([`FRTA_PORT`](crate::types::FRTA_PORT)) and must allow broadcast.
/// Sending to [`Ipv4Addr::BROADCAST`] reaches all neighbors.
pub trait Transport {
    /// Transport-specific error type.
    type Error: Debug;

    /// Send a datagram to the given destination.
    ///
    /// Must not block: either the datagram is queued/sent, or an error is
    /// returned immediately.
    fn send_to(&mut self, dest: Ipv4Addr, data: &[u8]) -> Result<(), Self::Error>;
}

/// Monotonic time source.
///
/// The epoch is arbitrary (boot time, simulation start) as long as it is
/// consistent within a session.
pub trait Clock {
    /// Get the current time.
    fn now(&self) -> Timestamp;
}

/// Random number generator trait.
///
/// Used for retransmission jitter that de-synchronizes flooders.
pub trait Random {
    /// Generate a uniform random u64 in the half-open range [min, max).
    fn gen_range(&mut self, min: u64, max: u64) -> u64;
}
