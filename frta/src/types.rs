//! Core types and constants for the FRTA protocol.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::time::{Duration, Timestamp};
use crate::wire::DecodeError;

// Control traffic port. Application traffic must use a different port.
pub const FRTA_PORT: u16 = 9;

// Timing constants
pub const ROUTE_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
pub const ROUTE_CACHE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
/// Retransmission jitter is drawn uniformly from [0, MAX_JITTER_US] inclusive.
pub const MAX_JITTER_US: u64 = 1000;

// Discovery limits
pub const MAX_HOP_COUNT: u32 = 10;
pub const MAX_PATHS: usize = 5;
pub const MIN_PATH_TRUST: f64 = 0.5;

// Trust model constants
/// Weight of a new observation in the exponential smoothing update.
pub const TRUST_SMOOTHING_ALPHA: f64 = 0.7;
/// Trust assumed for peers we have never observed.
pub const DEFAULT_TRUST: f64 = 0.5;
/// Trust seeded for a reverse route learned from a forwarded request.
pub const REVERSE_ROUTE_TRUST: f64 = 0.7;
/// Smoothed trust is clamped to [TRUST_FLOOR, TRUST_CEIL].
pub const TRUST_FLOOR: f64 = 0.1;
pub const TRUST_CEIL: f64 = 1.0;
/// Per-member adjustment applied on observed path delivery outcome.
pub const PATH_SUCCESS_BONUS: f64 = 0.1;
pub const PATH_FAILURE_PENALTY: f64 = 0.2;
/// Only cache entries above this trust are advertised.
pub const ADVERTISE_TRUST_FLOOR: f64 = 0.5;

// Collision detector constants
/// Weight of a new outcome in the collision probability EMA.
pub const COLLISION_SMOOTHING_ALPHA: f64 = 0.1;
/// Two transmissions from one sender closer than this are collision-prone.
pub const RAPID_FIRE_WINDOW: Duration = Duration::from_micros(100);
/// A link with more recorded collisions than this is considered risky.
pub const LINK_COLLISION_LIMIT: u32 = 5;
/// A sender whose smoothed collision probability exceeds this is risky.
pub const COLLISION_PROBABILITY_LIMIT: f64 = 0.5;

/// A cached route toward a destination.
///
/// Self entries (the local interfaces) have `next_hop` equal to the
/// destination and `hop_count == 0`; every other entry has
/// `next_hop != destination` and `hop_count >= 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteEntry {
    /// Neighbor to forward through.
    pub next_hop: Ipv4Addr,
    /// Trust in this route, in [0, 1].
    pub trust: f64,
    /// When the entry was last installed or refreshed.
    pub last_update: Timestamp,
    /// Hops to the destination (0 for self).
    pub hop_count: u32,
}

impl RouteEntry {
    /// Create an entry, clamping trust into [0, 1].
    pub fn new(next_hop: Ipv4Addr, trust: f64, last_update: Timestamp, hop_count: u32) -> Self {
        Self {
            next_hop,
            trust: trust.clamp(0.0, 1.0),
            last_update,
            hop_count,
        }
    }

    /// An entry is fresh while its age is strictly below the cache timeout.
    pub fn is_fresh(&self, now: Timestamp, timeout: Duration) -> bool {
        now.saturating_sub(self.last_update) < timeout
    }
}

/// A concrete route handed to callers of the routing interface.
///
/// Routes are plain values; callers never share ownership of cache state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    /// Final destination of the datagram.
    pub destination: Ipv4Addr,
    /// Next hop to forward through (unspecified for broadcast).
    pub gateway: Ipv4Addr,
    /// Local address the datagram should originate from.
    pub source: Ipv4Addr,
}

/// Outcome of routing an inbound datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboundDecision {
    /// The datagram is addressed to this node (or broadcast): deliver it.
    DeliverLocal,
    /// Forward the datagram along the given route.
    Forward(Route),
    /// No fresh route; the datagram is dropped.
    NoRoute,
}

/// Flooded request for a route to `dest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteRequest {
    pub dest: Ipv4Addr,
    pub source: Ipv4Addr,
    pub hop_count: u32,
}

/// Unicast reply carrying a usable next hop and its trust.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteReply {
    pub dest: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub trust: f64,
}

/// Periodic broadcast of a known route.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteAdvertisement {
    pub dest: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub trust: f64,
    pub hop_count: u32,
}

/// Periodic broadcast of the sender's own trust value.
///
/// The original carried this in an out-of-band per-packet tag on an empty
/// datagram; without such a side channel the same eight bytes travel in
/// the body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrustUpdate {
    pub trust: f64,
}

/// Deferred protocol work, re-entering the node as a message.
///
/// Every suspension is one of these, scheduled at an absolute fire time.
/// Handlers look up fresh state at fire time, so a timer whose trigger has
/// already been satisfied is a no-op.
#[derive(Clone, Debug, PartialEq)]
pub enum TimerEvent {
    /// Pending route request for `dest` expires.
    RequestTimeout { dest: Ipv4Addr },
    /// Jittered rebroadcast of a forwarded request.
    ForwardRequest { request: RouteRequest },
    /// Jittered unicast of a reply.
    SendReply {
        reply: RouteReply,
        next_hop: Ipv4Addr,
    },
    /// Periodic trust broadcast over all local interfaces.
    TrustBroadcast,
    /// Periodic advertisement of the route cache.
    Advertise,
    /// Periodic eviction of stale cache entries.
    CacheSweep,
}

/// Error type for protocol operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Datagram could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(#[from] DecodeError),
    /// No fresh route to the destination.
    #[error("no route to {0}")]
    NoRoute(Ipv4Addr),
    /// A route request expired without a reply.
    #[error("route request for {0} timed out")]
    Timeout(Ipv4Addr),
    /// The protocol instance has not been started.
    #[error("protocol not running")]
    NotRunning,
}
