//! # mkolbol Telemetry
//!
//! Logging and metrics setup shared by every microkernel crate.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, filtered by
//!   an `EnvFilter`, as human-readable text or JSON.
//! - **Metrics**: Prometheus counters and gauges in a process-wide registry.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mk_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MK_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `MK_JSON_LOGS` | `false` | Emit JSON lines instead of text |
//! | `MK_SERVICE_NAME` | `mkolbol` | Service name attached to the startup event |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, EXECUTOR_NODES_RUNNING,
    EXECUTOR_NODE_RESTARTS, EXECUTOR_WORKER_HANDSHAKES, FEDERATION_PEERS_ACTIVE,
    FEDERATION_PEER_FAILURES, FEDERATION_PROPAGATIONS, FEDERATION_RECEIVED, KERNEL_EDGES_ACTIVE,
    ROUTER_ANNOUNCEMENTS, ROUTER_ENDPOINTS, ROUTER_LISTENER_PANICS, ROUTER_SWEPT,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    tracing_setup::init_tracing(&config)?;
    Ok(TelemetryGuard { _metrics: metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
