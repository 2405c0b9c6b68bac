//! Runtime protocol configuration.
//!
//! Defaults match the protocol constants; tests and simulations override
//! individual knobs with the builder-style setters. The update interval is
//! additionally adjustable on a running node via
//! `FrtaNode::set_update_interval`.

use crate::time::Duration;
use crate::types::{
    DEFAULT_UPDATE_INTERVAL, MAX_HOP_COUNT, MAX_PATHS, MIN_PATH_TRUST, ROUTE_CACHE_TIMEOUT,
    ROUTE_REQUEST_TIMEOUT,
};

/// Tunable protocol parameters.
#[derive(Clone, Copy, Debug)]
pub struct ProtocolConfig {
    /// Period of routing updates and advertisements.
    pub update_interval: Duration,
    /// How long a route request stays pending without a reply.
    pub request_timeout: Duration,
    /// Cache entry freshness window and sweep period.
    pub cache_timeout: Duration,
    /// Requests are not forwarded past this hop count.
    pub max_hop_count: u32,
    /// Path enumeration stops after this many candidate paths.
    pub max_paths: usize,
    /// Minimum path trust for a path to count as trusted.
    pub min_path_trust: f64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            request_timeout: ROUTE_REQUEST_TIMEOUT,
            cache_timeout: ROUTE_CACHE_TIMEOUT,
            max_hop_count: MAX_HOP_COUNT,
            max_paths: MAX_PATHS,
            min_path_trust: MIN_PATH_TRUST,
        }
    }
}

impl ProtocolConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the update interval.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the cache timeout.
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let cfg = ProtocolConfig::default();
        assert_eq!(cfg.update_interval.as_secs(), 30);
        assert_eq!(cfg.request_timeout.as_secs(), 2);
        assert_eq!(cfg.cache_timeout.as_secs(), 30);
        assert_eq!(cfg.max_hop_count, 10);
        assert_eq!(cfg.max_paths, 5);
        assert_eq!(cfg.min_path_trust, 0.5);
    }

    #[test]
    fn test_builders() {
        let cfg = ProtocolConfig::new()
            .with_update_interval(Duration::from_secs(5))
            .with_cache_timeout(Duration::from_secs(10));
        assert_eq!(cfg.update_interval.as_secs(), 5);
        assert_eq!(cfg.cache_timeout.as_secs(), 10);
        assert_eq!(cfg.request_timeout.as_secs(), 2);
    }
}
