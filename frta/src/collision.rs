//! Collision detection and collision-aware path selection.
//!
//! Tracks per-sender transmission outcomes with an exponential moving
//! average, per-link collision counters, and a global success ratio, and
//! selects among candidate paths by minimum aggregated collision
//! probability.

use std::net::Ipv4Addr;

use hashbrown::HashMap;

use crate::time::Timestamp;
use crate::types::{
    COLLISION_PROBABILITY_LIMIT, COLLISION_SMOOTHING_ALPHA, LINK_COLLISION_LIMIT,
    RAPID_FIRE_WINDOW,
};

/// Transmission history for a single sender.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransmissionStats {
    /// When the sender last transmitted.
    pub last_transmission: Timestamp,
    /// Total observed transmissions.
    pub packet_count: u64,
    /// Smoothed collision probability, in [0, 1].
    pub collision_probability: f64,
}

/// Collision statistics and path optimization for the routing protocol.
#[derive(Debug, Default)]
pub struct CollisionDetector {
    transmission_stats: HashMap<Ipv4Addr, TransmissionStats>,
    collision_counts: HashMap<(Ipv4Addr, Ipv4Addr), u32>,
    success_count: u64,
    total_count: u64,
    probability_cache: f64,
    cache_valid: bool,
}

impl CollisionDetector {
    /// Create a detector with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a transmission from `sender`.
    ///
    /// Successful transmissions decay the sender's collision probability
    /// toward 0; failures pull it toward 1. The global success ratio cache
    /// is invalidated on every update.
    pub fn update_transmission(&mut self, sender: Ipv4Addr, success: bool, now: Timestamp) {
        let stats = self.transmission_stats.entry(sender).or_default();
        stats.last_transmission = now;
        stats.packet_count += 1;

        let alpha = COLLISION_SMOOTHING_ALPHA;
        if success {
            stats.collision_probability = (1.0 - alpha) * stats.collision_probability;
        } else {
            stats.collision_probability = alpha + (1.0 - alpha) * stats.collision_probability;
        }

        self.total_count += 1;
        if success {
            self.success_count += 1;
        }
        self.cache_valid = false;
    }

    /// Record a collision observed on the `sender -> receiver` link.
    pub fn record_link_collision(&mut self, sender: Ipv4Addr, receiver: Ipv4Addr) {
        *self.collision_counts.entry((sender, receiver)).or_insert(0) += 1;
    }

    /// Collisions recorded on the `sender -> receiver` link.
    pub fn link_collisions(&self, sender: Ipv4Addr, receiver: Ipv4Addr) -> u32 {
        self.collision_counts
            .get(&(sender, receiver))
            .copied()
            .unwrap_or(0)
    }

    /// Transmission history for a sender, if any.
    pub fn stats(&self, sender: Ipv4Addr) -> Option<&TransmissionStats> {
        self.transmission_stats.get(&sender)
    }

    /// Global collision probability derived from historical outcomes.
    ///
    /// 0.0 with no history, otherwise `1 - successes/total`. The derived
    /// value is cached until the next outcome is recorded.
    pub fn global_collision_probability(&mut self) -> f64 {
        if !self.cache_valid {
            self.probability_cache = if self.total_count == 0 {
                0.0
            } else {
                1.0 - (self.success_count as f64 / self.total_count as f64)
            };
            self.cache_valid = true;
        }
        self.probability_cache
    }

    /// Whether a transmission from `sender` to `receiver` is collision-prone.
    ///
    /// True if the sender transmitted within the rapid-fire window, the
    /// link has accumulated too many collisions, or the sender's smoothed
    /// collision probability is above the limit.
    pub fn detect_potential(&mut self, sender: Ipv4Addr, receiver: Ipv4Addr, now: Timestamp) -> bool {
        let stats = self.transmission_stats.entry(sender).or_default();

        if now.saturating_sub(stats.last_transmission) < RAPID_FIRE_WINDOW {
            return true;
        }

        if self.link_collisions(sender, receiver) > LINK_COLLISION_LIMIT {
            return true;
        }

        self.transmission_stats[&sender].collision_probability > COLLISION_PROBABILITY_LIMIT
    }

    /// Collision probability of a whole path.
    ///
    /// Grows logarithmically with path length, capped at 1.0. The empty
    /// path is unusable and has probability 1.0.
    pub fn path_collision_probability(&mut self, path: &[Ipv4Addr]) -> f64 {
        if path.is_empty() {
            return 1.0;
        }

        let base = self.global_collision_probability();
        let len = path.len() as f64;
        (base * (1.0 + len.ln())).min(1.0)
    }

    /// The candidate path with minimum collision probability.
    ///
    /// Returns the first minimizer on ties, and the empty path when no
    /// candidates are given.
    pub fn select_optimal_path(&mut self, paths: &[Vec<Ipv4Addr>]) -> Vec<Ipv4Addr> {
        let mut best: Option<(f64, &Vec<Ipv4Addr>)> = None;

        for path in paths {
            let prob = self.path_collision_probability(path);
            match best {
                Some((best_prob, _)) if prob >= best_prob => {}
                _ => best = Some((prob, path)),
            }
        }

        best.map(|(_, path)| path.clone()).unwrap_or_default()
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.transmission_stats.clear();
        self.collision_counts.clear();
        self.success_count = 0;
        self.total_count = 0;
        self.cache_valid = false;
    }
}
