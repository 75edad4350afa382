//! Federation configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default period between propagation ticks.
pub const DEFAULT_PROPAGATE_INTERVAL_MS: u64 = 5_000;

/// Consecutive failed propagations after which a peer is marked inactive.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// This instance's identity; peers resolving to it are skipped.
    pub router_id: String,
    pub propagate_interval_ms: u64,
    /// Zero disables deactivation.
    pub max_consecutive_failures: u32,
    /// Static peer URLs, e.g. `tcp://router-b:30020`.
    pub peers: Vec<String>,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            router_id: "router-local".to_string(),
            propagate_interval_ms: DEFAULT_PROPAGATE_INTERVAL_MS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            peers: Vec::new(),
        }
    }
}

impl FederationConfig {
    pub fn new(router_id: impl Into<String>) -> Self {
        Self {
            router_id: router_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_propagate_interval_ms(mut self, ms: u64) -> Self {
        self.propagate_interval_ms = ms;
        self
    }

    #[must_use]
    pub fn with_max_consecutive_failures(mut self, n: u32) -> Self {
        self.max_consecutive_failures = n;
        self
    }

    pub(crate) fn propagate_interval(&self) -> Duration {
        Duration::from_millis(self.propagate_interval_ms.max(1))
    }
}
