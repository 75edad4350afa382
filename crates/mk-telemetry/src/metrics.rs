//! Prometheus metrics for the microkernel.
//!
//! All metrics follow the naming convention: `mk_<component>_<metric>_<unit>`
//!
//! Metrics are usable before [`register_metrics`] is called; registration
//! only makes them visible to [`encode_metrics`].

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PIPE KERNEL
    // =========================================================================

    /// Forwarding edges currently running
    pub static ref KERNEL_EDGES_ACTIVE: IntGauge = IntGauge::new(
        "mk_kernel_edges_active",
        "Number of pipe forwarding edges currently running"
    ).expect("metric creation failed");

    // =========================================================================
    // ROUTING DIRECTORY
    // =========================================================================

    /// Announcements by outcome
    pub static ref ROUTER_ANNOUNCEMENTS: CounterVec = CounterVec::new(
        Opts::new("mk_router_announcements_total", "Endpoint announcements processed"),
        &["outcome"]  // outcome: added/updated
    ).expect("metric creation failed");

    /// Endpoints removed by the sweeper
    pub static ref ROUTER_SWEPT: IntCounter = IntCounter::new(
        "mk_router_swept_total",
        "Endpoints removed by TTL sweeps"
    ).expect("metric creation failed");

    /// Live endpoints summed over every directory in the process
    pub static ref ROUTER_ENDPOINTS: Gauge = Gauge::new(
        "mk_router_endpoints",
        "Endpoints currently held by the routing directory"
    ).expect("metric creation failed");

    /// Listener callbacks that panicked
    pub static ref ROUTER_LISTENER_PANICS: IntCounter = IntCounter::new(
        "mk_router_listener_panics_total",
        "Router event listeners that panicked during delivery"
    ).expect("metric creation failed");

    // =========================================================================
    // FEDERATION
    // =========================================================================

    /// Propagation attempts by outcome
    pub static ref FEDERATION_PROPAGATIONS: CounterVec = CounterVec::new(
        Opts::new("mk_federation_propagations_total", "Endpoint propagations to peers"),
        &["outcome"]  // outcome: success/failed
    ).expect("metric creation failed");

    /// Peers deactivated after repeated failures
    pub static ref FEDERATION_PEER_FAILURES: IntCounter = IntCounter::new(
        "mk_federation_peer_deactivations_total",
        "Peers marked inactive after repeated propagation failures"
    ).expect("metric creation failed");

    /// Active peers summed over every federation in the process
    pub static ref FEDERATION_PEERS_ACTIVE: IntGauge = IntGauge::new(
        "mk_federation_peers_active",
        "Peers currently receiving propagations"
    ).expect("metric creation failed");

    /// Announcements received from peers
    pub static ref FEDERATION_RECEIVED: IntCounter = IntCounter::new(
        "mk_federation_received_total",
        "Endpoint announcements received from peers"
    ).expect("metric creation failed");

    // =========================================================================
    // TOPOLOGY EXECUTOR
    // =========================================================================

    /// Nodes currently running, by run mode
    pub static ref EXECUTOR_NODES_RUNNING: prometheus::IntGaugeVec = prometheus::IntGaugeVec::new(
        Opts::new("mk_executor_nodes_running", "Nodes currently running"),
        &["run_mode"]  // run_mode: inproc/worker/process
    ).expect("metric creation failed");

    /// Worker readiness handshakes by outcome
    pub static ref EXECUTOR_WORKER_HANDSHAKES: CounterVec = CounterVec::new(
        Opts::new("mk_executor_worker_handshakes_total", "Worker readiness handshakes"),
        &["outcome"]  // outcome: ready/error/timeout/closed
    ).expect("metric creation failed");

    /// Node restarts
    pub static ref EXECUTOR_NODE_RESTARTS: IntCounter = IntCounter::new(
        "mk_executor_node_restarts_total",
        "Nodes restarted in place"
    ).expect("metric creation failed");
}

/// Handle returned by [`register_metrics`].
pub struct MetricsHandle {
    _registry: Registry,
}

/// Register all metrics with the global registry.
///
/// Calling it again is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Kernel
        Box::new(KERNEL_EDGES_ACTIVE.clone()),
        // Router
        Box::new(ROUTER_ANNOUNCEMENTS.clone()),
        Box::new(ROUTER_SWEPT.clone()),
        Box::new(ROUTER_ENDPOINTS.clone()),
        Box::new(ROUTER_LISTENER_PANICS.clone()),
        // Federation
        Box::new(FEDERATION_PROPAGATIONS.clone()),
        Box::new(FEDERATION_PEER_FAILURES.clone()),
        Box::new(FEDERATION_PEERS_ACTIVE.clone()),
        Box::new(FEDERATION_RECEIVED.clone()),
        // Executor
        Box::new(EXECUTOR_NODES_RUNNING.clone()),
        Box::new(EXECUTOR_WORKER_HANDSHAKES.clone()),
        Box::new(EXECUTOR_NODE_RESTARTS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: REGISTRY.clone(),
    })
}

/// Encode all registered metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
