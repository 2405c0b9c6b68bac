//! frta - Fault-Resilient, Trust-Aware routing for mobile ad-hoc networks.
//!
//! A reactive routing protocol: each node maintains a cache of reachable
//! destinations, a reputational trust score per neighbor, and collision
//! statistics per sender. Routes are discovered on demand by flooded
//! requests, answered along reverse paths, refreshed by periodic
//! advertisements, and ranked by trust and observed transmission success.
//!
//! # Key Properties
//!
//! - Discovery is reactive: requests flood with a hop limit and jittered
//!   rebroadcast; replies unicast back along the reverse path
//! - Trust is exponentially smoothed per node and derived per path as the
//!   member minimum
//! - Advertisements replace cached routes only when strictly better on
//!   both trust and hop count
//! - The collision detector ranks candidate paths by a length-scaled
//!   global collision probability
//!
//! # Example
//!
//! ```no_run
//! use frta::{FrtaNode, ProtocolConfig, Transport, Clock, Random};
//!
//! // Implement Transport, Clock, and Random for your platform...
//!
//! // let mut node = FrtaNode::new(transport, random, clock, interfaces, ProtocolConfig::default());
//! // node.start();
//! //
//! // loop {
//! //     // feed received datagrams:   node.handle_datagram(&data, sender);
//! //     // arm requested timers:      for (at, ev) in node.take_timers() { ... }
//! //     // fire due timers:           node.handle_timer(ev);
//! // }
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Core types (RouteEntry, messages, timers, constants)
//! - [`time`] - Timestamp and Duration (microsecond base)
//! - [`wire`] - Wire format serialization
//! - [`traits`] - Transport, Clock, Random seams
//! - [`config`] - Runtime protocol configuration
//! - [`state`] - Route cache, trust values, activity flags
//! - [`node`] - Main FrtaNode struct and lifecycle
//! - [`discovery`] - Request/reply route discovery
//! - [`advert`] - Periodic trust and route updates, cache maintenance
//! - [`routing`] - Routing interface and trusted-path selection
//! - [`trust`] - Trust smoothing and path trust
//! - [`collision`] - Collision detection and path optimization
//! - [`trace`] - Injected observer sink for protocol tracing

pub mod advert;
pub mod collision;
pub mod config;
pub mod discovery;
pub mod node;
pub mod routing;
pub mod state;
pub mod time;
pub mod trace;
pub mod traits;
pub mod trust;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use collision::{CollisionDetector, TransmissionStats};
pub use config::ProtocolConfig;
pub use node::FrtaNode;
pub use state::FrtaState;
pub use time::{Duration, Timestamp};
pub use trace::{NullSink, TraceEvent, TraceSink};
pub use traits::{Clock, Random, Transport};
pub use types::{
    Error, InboundDecision, Route, RouteAdvertisement, RouteEntry, RouteReply, RouteRequest,
    TimerEvent, TrustUpdate,
};
pub use wire::{Decode, DecodeError, Encode, Message};

// Re-export constants
pub use types::{
    FRTA_PORT, MAX_HOP_COUNT, MAX_PATHS, MIN_PATH_TRUST, ROUTE_CACHE_TIMEOUT,
    ROUTE_REQUEST_TIMEOUT,
};
