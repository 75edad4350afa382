//! The endpoint gauge is process-wide, so this lives in its own test binary
//! with a single test.

use mk_02_routing_directory::{RouterConfig, RoutingAnnouncement, RoutingDirectory};
use mk_telemetry::ROUTER_ENDPOINTS;
use shared_types::test_utils::ManualTimeSource;
use std::sync::Arc;

fn svc(id: &str) -> RoutingAnnouncement {
    RoutingAnnouncement::new(id, "inproc", format!("node:{id}"))
}

#[test]
fn test_directories_share_the_endpoint_gauge() {
    let base = ROUTER_ENDPOINTS.get();
    let clock = ManualTimeSource::new(0);
    let a = RoutingDirectory::with_time_source(
        RouterConfig::default().with_ttl_ms(1_000),
        Arc::new(clock.clone()),
    );
    let b = RoutingDirectory::new(RouterConfig::default());

    a.announce(svc("a-1")).unwrap();
    a.announce(svc("a-2")).unwrap();
    b.announce(svc("b-1")).unwrap();
    // Re-announcing is an update, not a new endpoint.
    b.announce(svc("b-1")).unwrap();
    assert_eq!(ROUTER_ENDPOINTS.get(), base + 3.0);

    // A mutation on one directory leaves the other's share alone.
    assert!(b.withdraw("b-1"));
    assert!(!b.withdraw("b-1"));
    assert_eq!(ROUTER_ENDPOINTS.get(), base + 2.0);

    b.announce(svc("b-2")).unwrap();
    clock.advance(1_001);
    assert_eq!(a.sweep().len(), 2);
    assert_eq!(ROUTER_ENDPOINTS.get(), base + 1.0);

    drop(b);
    assert_eq!(ROUTER_ENDPOINTS.get(), base);
    drop(a);
}
