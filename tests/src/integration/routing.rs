//! # Routing and Federation
//!
//! TTL expiry on a manual clock, and two federated directories fed by a
//! running topology.

use anyhow::{Context, Result};
use mk_01_pipe_kernel::Kernel;
use mk_02_routing_directory::{
    ManualTimeSource, RouterConfig, RouterEventKind, RoutingAnnouncement, RoutingDirectory,
};
use mk_03_federation::{ConfigPeerSource, Federation, FederationConfig, InMemoryMesh};
use mk_04_topology_executor::{
    parse_topology, InMemoryIdentityRegistry, InMemoryNodeGraph, ModuleRegistry,
    TopologyExecutor,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

async fn eventually(mut condition: impl FnMut() -> bool) -> Result<()> {
    for _ in 0..400 {
        if condition() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("condition not reached")
}

fn federation(
    router_id: &str,
    dir: &RoutingDirectory,
    peer: &str,
    mesh: Arc<InMemoryMesh>,
) -> Federation {
    Federation::new(
        FederationConfig::new(router_id).with_propagate_interval_ms(60_000),
        dir.clone(),
        Arc::new(ConfigPeerSource::new([peer])),
        mesh,
    )
}

#[tokio::test]
async fn test_sweep_expires_only_stale_endpoints() -> Result<()> {
    let clock = ManualTimeSource::new(0);
    let dir = RoutingDirectory::with_time_source(
        RouterConfig::default().with_ttl_ms(1_000),
        Arc::new(clock.clone()),
    );
    let removed = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&removed);
    let _subscription = dir.subscribe(move |event| {
        if event.kind == RouterEventKind::Removed {
            seen.lock().push(event.endpoint.id.clone());
        }
    });

    dir.announce(RoutingAnnouncement::new("a", "inproc", "node:a"))?;
    dir.announce(RoutingAnnouncement::new("b", "inproc", "node:b"))?;
    clock.advance(600);
    dir.announce(RoutingAnnouncement::new("b", "inproc", "node:b"))?;
    clock.advance(600);

    assert_eq!(dir.sweep(), vec!["a".to_string()]);
    assert!(dir.get("a").is_none());
    assert!(dir.get("b").is_some());
    assert_eq!(dir.sweep_stats().total_removed, 1);
    assert_eq!(*removed.lock(), vec!["a".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_topology_endpoints_federate_without_echo() -> Result<()> {
    let dir_a = RoutingDirectory::new(RouterConfig::default());
    let dir_b = RoutingDirectory::new(RouterConfig::default());
    let mesh = Arc::new(InMemoryMesh::new());
    let fed_a = federation("a", &dir_a, "tcp://b:30020", mesh.clone());
    let fed_b = federation("b", &dir_b, "tcp://a:30020", mesh.clone());
    mesh.join(&fed_a);
    mesh.join(&fed_b);
    fed_a.start().await;
    fed_b.start().await;

    let kernel = Kernel::new();
    let mut executor = TopologyExecutor::new(
        kernel.clone(),
        Arc::new(InMemoryIdentityRegistry::new()),
        Arc::new(InMemoryNodeGraph::new(kernel)),
        Arc::new(ModuleRegistry::new()),
    )
    .with_router(dir_a.clone());
    executor.load(parse_topology(
        "nodes:\n  - id: timer\n    module: TimerSource\nconnections: []\n",
    )?)?;
    executor.up().await?;

    let report = fed_a.propagate_now();
    assert_eq!(report.endpoint_count, 1);
    eventually(|| dir_b.get("timer").is_some()).await?;
    let replica = dir_b.get("timer").context("timer not replicated")?;
    assert_eq!(replica.federation_source(), Some("a"));
    assert_eq!(replica.coordinates, "node:timer");

    // b owns nothing, so nothing flows back to a.
    let back = fed_b.propagate_now();
    assert_eq!(back.endpoint_count, 0);
    assert_eq!(fed_a.status().local_endpoint_count, 1);

    executor.down().await;
    assert_eq!(fed_a.status().local_endpoint_count, 0);

    fed_a.stop();
    fed_b.stop();
    Ok(())
}

#[tokio::test]
async fn test_partitioned_peer_is_deactivated_then_recovers() -> Result<()> {
    let dir_a = RoutingDirectory::new(RouterConfig::default());
    let dir_b = RoutingDirectory::new(RouterConfig::default());
    let mesh = Arc::new(InMemoryMesh::new());
    let fed_a = federation("a", &dir_a, "tcp://b:30020", mesh.clone());
    let fed_b = federation("b", &dir_b, "tcp://a:30020", mesh.clone());
    mesh.join(&fed_a);
    mesh.join(&fed_b);
    fed_a.start().await;
    fed_b.start().await;
    dir_a.announce(RoutingAnnouncement::new("svc", "inproc", "node:svc"))?;
    dir_b.announce(RoutingAnnouncement::new("svc-b", "inproc", "node:svc-b"))?;

    mesh.set_reachable("b", false);
    for attempt in 1..=3 {
        fed_a.propagate_now();
        eventually(|| fed_a.status().peers[0].consecutive_failures == attempt).await?;
    }
    assert!(!fed_a.status().peers[0].active);
    assert!(fed_a.propagate_now().dispatched_to.is_empty());

    // Hearing from b reactivates it.
    mesh.set_reachable("b", true);
    fed_b.propagate_now();
    eventually(|| fed_a.status().peers[0].active).await?;
    fed_a.propagate_now();
    eventually(|| dir_b.get("svc").is_some()).await?;

    fed_a.stop();
    fed_b.stop();
    Ok(())
}
