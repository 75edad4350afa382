//! The active-peer gauge is process-wide, so this lives in its own test
//! binary with a single test.

use mk_02_routing_directory::{RouterConfig, RoutingAnnouncement, RoutingDirectory};
use mk_03_federation::{ConfigPeerSource, Federation, FederationConfig, LoggingPeerTransport};
use mk_telemetry::FEDERATION_PEERS_ACTIVE;
use std::sync::Arc;

fn federation(router_id: &str, peers: &[&str]) -> Federation {
    Federation::new(
        FederationConfig::new(router_id).with_propagate_interval_ms(60_000),
        RoutingDirectory::new(RouterConfig::default()),
        Arc::new(ConfigPeerSource::new(peers.iter().copied())),
        Arc::new(LoggingPeerTransport),
    )
}

#[tokio::test]
async fn test_federations_share_the_active_peer_gauge() {
    let base = FEDERATION_PEERS_ACTIVE.get();
    let a = federation("a", &["tcp://b:1", "tcp://c:1"]);
    let b = federation("b", &["tcp://a:1"]);

    a.start().await;
    b.start().await;
    assert_eq!(FEDERATION_PEERS_ACTIVE.get(), base + 3);

    // Rediscovering known peers adds nothing.
    assert_eq!(a.refresh_peers().await, 2);
    assert_eq!(FEDERATION_PEERS_ACTIVE.get(), base + 3);

    // Stopping one federation leaves the other's peers counted.
    b.stop();
    assert_eq!(FEDERATION_PEERS_ACTIVE.get(), base + 2);
    b.stop();
    assert_eq!(FEDERATION_PEERS_ACTIVE.get(), base + 2);

    a.receive_from_peer("b", RoutingAnnouncement::new("svc", "inproc", "node:svc"))
        .unwrap();
    assert_eq!(FEDERATION_PEERS_ACTIVE.get(), base + 2);

    // Dropped while running.
    drop(a);
    assert_eq!(FEDERATION_PEERS_ACTIVE.get(), base);
}
