//! Periodic updates and route cache maintenance.
//!
//! Every update interval the node broadcasts a trust update per local
//! interface and its fresh, sufficiently trusted cache entries. A
//! received advertisement replaces the local entry only when it is
//! strictly better on both axes (higher trust and fewer hops). A
//! periodic sweep evicts entries that have aged past the cache timeout.

use crate::node::FrtaNode;
use crate::trace::TraceEvent;
use crate::traits::{Clock, Random, Transport};
use crate::types::{
    RouteAdvertisement, RouteEntry, TimerEvent, TrustUpdate, ADVERTISE_TRUST_FLOOR,
};
use crate::wire::Message;

impl<T, R, C> FrtaNode<T, R, C>
where
    T: Transport,
    R: Random,
    C: Clock,
{
    /// Periodic trust broadcast: one `TrustUpdate` per local interface.
    pub(crate) fn handle_trust_broadcast(&mut self) {
        if !self.running {
            return;
        }
        let now = self.now();

        for i in 0..self.interfaces.len() {
            let interface = self.interfaces[i];
            let trust = self.state.get_trust(interface);
            self.broadcast(&Message::TrustUpdate(TrustUpdate { trust }));
            self.emit(TraceEvent::TrustBroadcast {
                timestamp: now,
                interface,
                trust,
            });
        }

        self.schedule(now + self.config.update_interval, TimerEvent::TrustBroadcast);
    }

    /// Periodic advertisement of the route cache.
    pub(crate) fn handle_advertise(&mut self) {
        if !self.running {
            return;
        }
        let now = self.now();

        let advertisements: Vec<RouteAdvertisement> = self
            .state
            .routes()
            .filter(|(_, entry)| {
                entry.trust > ADVERTISE_TRUST_FLOOR
                    && entry.is_fresh(now, self.config.cache_timeout)
            })
            .map(|(&dest, entry)| RouteAdvertisement {
                dest,
                next_hop: entry.next_hop,
                trust: entry.trust,
                hop_count: entry.hop_count,
            })
            .collect();

        for adv in advertisements {
            self.broadcast(&Message::RouteAdvertisement(adv));
            self.emit(TraceEvent::AdvertisementSent {
                timestamp: now,
                dest: adv.dest,
                trust: adv.trust,
                hop_count: adv.hop_count,
            });
        }

        self.schedule(now + self.config.update_interval, TimerEvent::Advertise);
    }

    /// Ingest a peer's advertisement.
    ///
    /// The replacement rule is strict on both axes: an existing entry is
    /// only displaced by one with higher trust and fewer hops. The stored
    /// hop count accounts for the hop to the advertiser.
    pub(crate) fn handle_advertisement(&mut self, adv: RouteAdvertisement) {
        let now = self.now();

        let better = match self.state.get_route(adv.dest) {
            None => true,
            Some(existing) => adv.trust > existing.trust && adv.hop_count < existing.hop_count,
        };

        if !better {
            self.emit(TraceEvent::AdvertisementRejected {
                timestamp: now,
                dest: adv.dest,
            });
            return;
        }

        let entry = RouteEntry::new(adv.next_hop, adv.trust, now, adv.hop_count + 1);
        self.state.add_route(adv.dest, entry);
        self.emit(TraceEvent::AdvertisementAccepted {
            timestamp: now,
            dest: adv.dest,
            next_hop: adv.next_hop,
            trust: adv.trust,
            hop_count: entry.hop_count,
        });
    }

    /// Periodic eviction of cache entries older than the cache timeout.
    pub(crate) fn handle_cache_sweep(&mut self) {
        if !self.running {
            return;
        }
        let now = self.now();

        let expired: Vec<_> = self
            .state
            .routes()
            .filter(|(_, entry)| now.saturating_sub(entry.last_update) >= self.config.cache_timeout)
            .map(|(&dest, _)| dest)
            .collect();

        for dest in &expired {
            self.state.remove_route(*dest);
            self.emit(TraceEvent::RouteExpired {
                timestamp: now,
                dest: *dest,
            });
        }

        self.emit(TraceEvent::SweepCompleted {
            timestamp: now,
            removed: expired.len(),
        });
        self.schedule(now + self.config.cache_timeout, TimerEvent::CacheSweep);
    }
}
