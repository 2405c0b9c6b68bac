//! On-demand route discovery: flooded requests, reverse paths, replies.
//!
//! Requests are broadcast with a hop counter and rebroadcast by
//! intermediates after a small uniform jitter, bounded by the hop limit.
//! There is no request identifier; duplicate suppression is emergent from
//! the reverse-route install and the hop limit. Replies travel unicast
//! back along the reverse path, installing a one-hop cache entry at every
//! node that processes them.

use std::net::Ipv4Addr;

use crate::node::FrtaNode;
use crate::time::Duration;
use crate::trace::TraceEvent;
use crate::traits::{Clock, Random, Transport};
use crate::types::{
    RouteEntry, RouteReply, RouteRequest, TimerEvent, MAX_JITTER_US, REVERSE_ROUTE_TRUST,
};
use crate::wire::Message;

impl<T, R, C> FrtaNode<T, R, C>
where
    T: Transport,
    R: Random,
    C: Clock,
{
    /// Originate a route request for `dest`.
    ///
    /// Broadcasts the request, records it as pending, and arms the
    /// request timeout. There is no automatic retry; re-requesting is the
    /// caller's decision on the next datagram.
    pub fn send_route_request(&mut self, dest: Ipv4Addr) {
        let now = self.now();
        let request = RouteRequest {
            dest,
            source: self.local_address(),
            hop_count: 0,
        };
        self.broadcast(&Message::RouteRequest(request));

        self.pending_requests.insert(dest);
        self.route_request_time.insert(dest, now);
        self.schedule(
            now + self.config.request_timeout,
            TimerEvent::RequestTimeout { dest },
        );
        self.emit(TraceEvent::RequestSent {
            timestamp: now,
            dest,
        });
    }

    /// Ingest a route request heard from `sender`.
    pub(crate) fn handle_request(&mut self, request: RouteRequest, sender: Ipv4Addr) {
        let now = self.now();

        // Our own flooded request came back around.
        if request.source == self.local_address() {
            self.emit(TraceEvent::RequestIgnored {
                timestamp: now,
                dest: request.dest,
                reason: "own request",
            });
            return;
        }

        // Install (or refresh) the reverse route toward the requester.
        self.state.add_route(
            request.source,
            RouteEntry::new(sender, REVERSE_ROUTE_TRUST, now, request.hop_count + 1),
        );
        self.update_trust(sender, REVERSE_ROUTE_TRUST);

        // We are the destination: answer directly.
        if self.is_local(request.dest) {
            self.send_route_reply(request.source, sender);
            return;
        }

        // We hold a fresh route to the destination: answer for it.
        let has_fresh_route = self
            .state
            .get_route(request.dest)
            .is_some_and(|entry| entry.is_fresh(now, self.config.cache_timeout));
        if has_fresh_route {
            self.send_route_reply(request.source, sender);
            return;
        }

        // Otherwise flood onward, jittered to de-synchronize neighbors.
        if request.hop_count < self.config.max_hop_count {
            let forwarded = RouteRequest {
                hop_count: request.hop_count + 1,
                ..request
            };
            let delay = self.jitter();
            self.schedule(now + delay, TimerEvent::ForwardRequest { request: forwarded });
            self.emit(TraceEvent::RequestForwarded {
                timestamp: now,
                dest: request.dest,
                hop_count: forwarded.hop_count,
            });
        } else {
            self.emit(TraceEvent::RequestIgnored {
                timestamp: now,
                dest: request.dest,
                reason: "hop limit",
            });
        }
    }

    /// Originate a reply to `to`, routed through `via_next_hop`.
    ///
    /// The reply carries our current trust in the next hop and is
    /// unicast to it after a small jitter.
    pub(crate) fn send_route_reply(&mut self, to: Ipv4Addr, via_next_hop: Ipv4Addr) {
        let now = self.now();
        let reply = RouteReply {
            dest: to,
            next_hop: via_next_hop,
            trust: self.state.get_trust(via_next_hop),
        };

        let delay = self.jitter();
        self.schedule(
            now + delay,
            TimerEvent::SendReply {
                reply,
                next_hop: via_next_hop,
            },
        );
        self.emit(TraceEvent::ReplySent {
            timestamp: now,
            dest: to,
            next_hop: via_next_hop,
        });
    }

    /// Ingest a route reply heard from `sender`.
    ///
    /// The sender becomes the next hop toward the reply's destination at
    /// hop count 1, even when the sender is an intermediate relay rather
    /// than the true last hop (source behavior, carried as-is).
    pub(crate) fn handle_reply(&mut self, reply: RouteReply, sender: Ipv4Addr) {
        let now = self.now();

        self.update_trust(sender, reply.trust);
        self.update_trust(reply.next_hop, reply.trust);

        self.state
            .add_route(reply.dest, RouteEntry::new(sender, reply.trust, now, 1));
        self.emit(TraceEvent::ReplyReceived {
            timestamp: now,
            dest: reply.dest,
            from: sender,
            trust: reply.trust,
        });

        // Relay the reply toward its destination when we are not it.
        if !self.is_local(reply.dest) {
            let relay_via = self.state.get_route(reply.dest).and_then(|entry| {
                (entry.is_fresh(now, self.config.cache_timeout) && entry.next_hop != reply.dest)
                    .then_some(entry.next_hop)
            });
            if let Some(via) = relay_via {
                self.send_route_reply(reply.dest, via);
            }
        }

        self.pending_requests.remove(&reply.dest);
    }

    /// A pending request expired without a reply.
    ///
    /// No-op if the request was satisfied in the meantime.
    pub(crate) fn handle_request_timeout(&mut self, dest: Ipv4Addr) {
        if self.pending_requests.remove(&dest) {
            self.route_request_time.remove(&dest);
            let timestamp = self.now();
            self.emit(TraceEvent::RequestTimedOut { timestamp, dest });
        }
    }

    /// Uniform retransmission jitter in [0, 1000] us.
    pub(crate) fn jitter(&mut self) -> Duration {
        Duration::from_micros(self.random.gen_range(0, MAX_JITTER_US + 1))
    }
}
