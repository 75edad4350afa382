//! # Runtime Configuration
//!
//! One TOML document configures the routing directory, federation and the
//! executor. Every key is optional:
//!
//! ```toml
//! [router]
//! ttl_ms = 30000
//! sweep_interval_ms = 10000
//!
//! [federation]
//! router_id = "router-a"
//! propagate_interval_ms = 5000
//! max_consecutive_failures = 3
//! peers = ["tcp://router-b:30020"]
//!
//! [executor]
//! handshake_timeout_ms = 10000
//! shutdown_timeout_ms = 5000
//! ```
//!
//! Environment variables override the file:
//!
//! | Variable | Key |
//! |----------|-----|
//! | `MK_TTL_MS` | `router.ttl_ms` |
//! | `MK_SWEEP_INTERVAL_MS` | `router.sweep_interval_ms` |
//! | `MK_ROUTER_ID` | `federation.router_id` |
//! | `MK_PROPAGATE_INTERVAL_MS` | `federation.propagate_interval_ms` |
//! | `MK_MAX_CONSECUTIVE_FAILURES` | `federation.max_consecutive_failures` |
//! | `MK_PEERS` | `federation.peers` (comma-separated) |
//! | `MK_HANDSHAKE_TIMEOUT_MS` | `executor.handshake_timeout_ms` |
//! | `MK_SHUTDOWN_TIMEOUT_MS` | `executor.shutdown_timeout_ms` |

use crate::domain::ConfigError;
use mk_02_routing_directory::RouterConfig;
use mk_03_federation::FederationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Executor timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Bound on waiting for a worker's `worker.ready`.
    pub handshake_timeout_ms: u64,
    /// Grace period for a worker thread or child process to exit.
    pub shutdown_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub router: RouterConfig,
    pub federation: FederationConfig,
    pub executor: ExecutorConfig,
}

impl RuntimeConfig {
    /// Parse a TOML document.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Load `path` when given, else defaults, then apply process environment
    /// overrides.
    pub fn from_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `MK_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "MK_TTL_MS", &mut self.router.ttl_ms)?;
        override_parsed(
            &lookup,
            "MK_SWEEP_INTERVAL_MS",
            &mut self.router.sweep_interval_ms,
        )?;
        if let Some(router_id) = lookup("MK_ROUTER_ID") {
            self.federation.router_id = router_id;
        }
        override_parsed(
            &lookup,
            "MK_PROPAGATE_INTERVAL_MS",
            &mut self.federation.propagate_interval_ms,
        )?;
        override_parsed(
            &lookup,
            "MK_MAX_CONSECUTIVE_FAILURES",
            &mut self.federation.max_consecutive_failures,
        )?;
        if let Some(peers) = lookup("MK_PEERS") {
            self.federation.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        override_parsed(
            &lookup,
            "MK_HANDSHAKE_TIMEOUT_MS",
            &mut self.executor.handshake_timeout_ms,
        )?;
        override_parsed(
            &lookup,
            "MK_SHUTDOWN_TIMEOUT_MS",
            &mut self.executor.shutdown_timeout_ms,
        )?;
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: raw.clone(),
    })?;
    info!(key, value = %raw, "config override");
    Ok(())
}
