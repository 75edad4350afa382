//! Directory configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time an endpoint stays live without a re-announce.
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Default period of the sweeper task.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 10_000;

/// Routing directory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Milliseconds an endpoint survives without being re-announced.
    pub ttl_ms: u64,
    /// Milliseconds between sweeper ticks.
    pub sweep_interval_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl RouterConfig {
    #[must_use]
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    #[must_use]
    pub fn with_sweep_interval_ms(mut self, sweep_interval_ms: u64) -> Self {
        self.sweep_interval_ms = sweep_interval_ms;
        self
    }

    pub(crate) fn sweep_interval(&self) -> Duration {
        // A zero period would spin.
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}
