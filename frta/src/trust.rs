//! Trust model: exponential smoothing per node, path trust derivation.
//!
//! Node trust is a reputational scalar in [0.1, 1.0] maintained by
//! exponential smoothing of observations. Path trust is the minimum member
//! trust, memoized per exact address sequence and invalidated when member
//! trusts are adjusted by observed delivery outcomes.

use std::net::Ipv4Addr;

use crate::node::FrtaNode;
use crate::trace::TraceEvent;
use crate::traits::{Clock, Random, Transport};
use crate::types::{
    PATH_FAILURE_PENALTY, PATH_SUCCESS_BONUS, TRUST_CEIL, TRUST_FLOOR, TRUST_SMOOTHING_ALPHA,
};

/// One smoothing step: weighted average of the observation and the
/// current value, clamped into [0.1, 1.0].
pub(crate) fn smooth(current: f64, observed: f64) -> f64 {
    let blended = TRUST_SMOOTHING_ALPHA * observed + (1.0 - TRUST_SMOOTHING_ALPHA) * current;
    blended.clamp(TRUST_FLOOR, TRUST_CEIL)
}

impl<T, R, C> FrtaNode<T, R, C>
where
    T: Transport,
    R: Random,
    C: Clock,
{
    /// Fold an observed trust value into a node's smoothed trust.
    pub fn update_trust(&mut self, node: Ipv4Addr, observed: f64) {
        let current = self.state.get_trust(node);
        let updated = smooth(current, observed);
        self.state.update_trust(node, updated);
        let timestamp = self.now();
        self.emit(TraceEvent::TrustUpdated {
            timestamp,
            node,
            trust: updated,
        });
    }

    /// Trust of a path: the minimum member trust, 0.0 for the empty path.
    ///
    /// Unknown members count as the default trust. Results are memoized
    /// per exact address sequence.
    pub fn path_trust(&mut self, path: &[Ipv4Addr]) -> f64 {
        if path.is_empty() {
            return 0.0;
        }

        if let Some(&cached) = self.path_trust_cache.get(path) {
            return cached;
        }

        let mut min_trust = 1.0f64;
        for &node in path {
            // get_trust defaults unknown members to DEFAULT_TRUST.
            min_trust = min_trust.min(self.state.get_trust(node));
        }

        self.path_trust_cache.insert(path.to_vec(), min_trust);
        min_trust
    }

    /// Adjust member trusts after an observed delivery outcome on `path`.
    ///
    /// Success raises each member by 0.1 (capped at 1.0); failure lowers
    /// each by 0.2 (floored at 0.0). The adjustments are written to the
    /// store directly, bypassing the smoothing clamp. Each outcome also
    /// feeds the collision detector, and the memoized path trust is
    /// recomputed.
    pub fn update_path_trust(&mut self, path: &[Ipv4Addr], success: bool) {
        if path.is_empty() {
            return;
        }
        let now = self.now();

        for &node in path {
            let trust = self.state.get_trust(node);
            let adjusted = if success {
                (trust + PATH_SUCCESS_BONUS).min(1.0)
            } else {
                (trust - PATH_FAILURE_PENALTY).max(0.0)
            };
            self.state.update_trust(node, adjusted);
            self.collision.update_transmission(node, success, now);
        }

        // Recompute the memoized value under the adjusted member trusts.
        self.path_trust_cache.remove(path);
        self.path_trust(path);
    }

    /// Whether a path's trust reaches the configured minimum.
    pub fn is_path_trusted(&mut self, path: &[Ipv4Addr]) -> bool {
        if path.is_empty() {
            return false;
        }
        self.path_trust(path) >= self.config.min_path_trust
    }
}
