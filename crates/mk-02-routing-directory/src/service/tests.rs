use super::*;
use parking_lot::Mutex as PlMutex;
use proptest::prelude::*;
use serde_json::json;
use shared_types::test_utils::ManualTimeSource;
use shared_types::Metadata;
use std::time::Duration;

fn directory(ttl_ms: u64) -> (RoutingDirectory, ManualTimeSource) {
    let clock = ManualTimeSource::new(10_000);
    let dir = RoutingDirectory::with_time_source(
        RouterConfig::default().with_ttl_ms(ttl_ms),
        Arc::new(clock.clone()),
    );
    (dir, clock)
}

fn svc(id: &str) -> RoutingAnnouncement {
    RoutingAnnouncement::new(id, "inproc", format!("node:{id}"))
}

fn recorder(dir: &RoutingDirectory) -> (Subscription, Arc<PlMutex<Vec<RouterEvent>>>) {
    let events = Arc::new(PlMutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let sub = dir.subscribe(move |e| sink.lock().push(e.clone()));
    (sub, events)
}

// =============================================================================
// announce / withdraw / list
// =============================================================================

#[test]
fn test_announce_requires_id() {
    let (dir, _) = directory(1_000);
    let err = dir.announce(svc("")).unwrap_err();
    assert!(matches!(err, RoutingError::InvalidArgument(_)));
    assert!(dir.is_empty());
}

#[test]
fn test_announce_sets_expiry_and_preserves_announced_at() {
    let (dir, clock) = directory(1_000);
    let first = dir.announce(svc("svc-a")).unwrap();
    assert_eq!(first.announced_at.as_millis(), 10_000);
    assert_eq!(first.expires_at.as_millis(), 11_000);

    clock.advance(400);
    let second = dir.announce(svc("svc-a")).unwrap();
    assert_eq!(second.announced_at, first.announced_at);
    assert_eq!(second.updated_at.as_millis(), 10_400);
    assert_eq!(second.expires_at.as_millis(), 11_400);
}

#[test]
fn test_announce_emits_added_then_updated() {
    let (dir, _) = directory(1_000);
    let (_sub, events) = recorder(&dir);
    dir.announce(svc("svc-a")).unwrap();
    dir.announce(svc("svc-a")).unwrap();
    let kinds: Vec<_> = events.lock().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![RouterEventKind::Added, RouterEventKind::Updated]);
}

#[test]
fn test_withdraw_is_final_and_silent_when_absent() {
    let (dir, _) = directory(1_000);
    let (_sub, events) = recorder(&dir);
    dir.announce(svc("svc-a")).unwrap();

    assert!(dir.withdraw("svc-a"));
    assert!(!dir.withdraw("svc-a"));
    assert!(!dir.withdraw(""));
    assert!(dir.list().iter().all(|e| e.id != "svc-a"));

    let kinds: Vec<_> = events.lock().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![RouterEventKind::Added, RouterEventKind::Removed]);
}

#[test]
fn test_list_is_an_independent_snapshot() {
    let (dir, _) = directory(1_000);
    let mut metadata = Metadata::new();
    metadata.insert("zone".into(), json!("a"));
    dir.announce(svc("svc-a").with_metadata(metadata)).unwrap();

    let mut snapshot = dir.list();
    snapshot[0]
        .metadata
        .as_mut()
        .unwrap()
        .insert("zone".into(), json!("mutated"));
    snapshot.clear();

    let fresh = dir.get("svc-a").unwrap();
    assert_eq!(fresh.metadata.unwrap()["zone"], json!("a"));
    assert_eq!(dir.len(), 1);
}

// =============================================================================
// resolve
// =============================================================================

#[test]
fn test_resolve_prefers_most_recently_updated() {
    let (dir, clock) = directory(10_000);
    dir.announce(RoutingAnnouncement::new("b", "tcp", "host:1")).unwrap();
    clock.advance(5);
    dir.announce(RoutingAnnouncement::new("c", "tcp", "host:1")).unwrap();
    clock.advance(5);
    dir.announce(RoutingAnnouncement::new("z", "tcp", "host:2")).unwrap();

    assert_eq!(dir.resolve("host:1").unwrap().id, "c");
    assert!(dir.resolve("host:3").is_none());
}

#[test]
fn test_resolve_tie_breaks_on_smallest_id() {
    let (dir, _) = directory(10_000);
    // Same clock reading for all three
    dir.announce(RoutingAnnouncement::new("m", "tcp", "host:1")).unwrap();
    dir.announce(RoutingAnnouncement::new("b", "tcp", "host:1")).unwrap();
    dir.announce(RoutingAnnouncement::new("x", "tcp", "host:1")).unwrap();
    assert_eq!(dir.resolve("host:1").unwrap().id, "b");
}

#[test]
fn test_resolve_does_not_filter_expired() {
    let (dir, clock) = directory(100);
    dir.announce(svc("svc-a")).unwrap();
    clock.advance(1_000);
    assert_eq!(dir.resolve("node:svc-a").unwrap().id, "svc-a");
}

// =============================================================================
// sweep
// =============================================================================

#[test]
fn test_sweep_is_explicit_not_lazy() {
    let (dir, clock) = directory(1_000);
    dir.announce(svc("svc-a")).unwrap();
    assert_eq!(dir.list().len(), 1);

    clock.advance(1_500);
    assert_eq!(dir.list().len(), 1, "nothing expires until a sweep runs");

    assert_eq!(dir.sweep(), vec!["svc-a".to_string()]);
    assert!(dir.list().is_empty());
}

#[test]
fn test_sweep_boundary_is_strictly_greater_than_ttl() {
    let (dir, clock) = directory(1_000);
    dir.announce(svc("svc-a")).unwrap();

    clock.advance(1_000);
    assert!(dir.sweep().is_empty(), "age == ttl is still live");
    clock.advance(1);
    assert_eq!(dir.sweep().len(), 1);
}

#[test]
fn test_sweep_updates_stats_and_emits_removed() {
    let (dir, clock) = directory(1_000);
    let (_sub, events) = recorder(&dir);
    dir.announce(svc("a")).unwrap();
    dir.announce(svc("b")).unwrap();
    clock.advance(600);
    dir.announce(svc("b")).unwrap();
    clock.advance(600);

    assert_eq!(dir.sweep(), vec!["a".to_string()]);
    dir.sweep();

    let stats = dir.sweep_stats();
    assert_eq!(stats.total_sweeps, 2);
    assert_eq!(stats.total_removed, 1);
    assert_eq!(stats.last_sweep_time.unwrap().as_millis(), 11_200);

    let removed: Vec<_> = events
        .lock()
        .iter()
        .filter(|e| e.kind == RouterEventKind::Removed)
        .map(|e| e.endpoint.id.clone())
        .collect();
    assert_eq!(removed, vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_task_runs_and_stops() {
    let clock = ManualTimeSource::new(0);
    let dir = RoutingDirectory::with_time_source(
        RouterConfig::default()
            .with_ttl_ms(100)
            .with_sweep_interval_ms(50),
        Arc::new(clock.clone()),
    );
    dir.start_sweeper();
    dir.start_sweeper();
    assert!(dir.is_sweeping());

    dir.announce(svc("svc-a")).unwrap();
    clock.advance(500);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(dir.is_empty());
    assert!(dir.sweep_stats().total_sweeps >= 1);

    dir.stop_sweeper();
    dir.stop_sweeper();
    assert!(!dir.is_sweeping());
    let sweeps = dir.sweep_stats().total_sweeps;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(dir.sweep_stats().total_sweeps, sweeps);
}

// =============================================================================
// subscriptions
// =============================================================================

#[test]
fn test_listeners_run_in_registration_order() {
    let (dir, _) = directory(1_000);
    let order = Arc::new(PlMutex::new(Vec::new()));
    let (o1, o2) = (Arc::clone(&order), Arc::clone(&order));
    let _s1 = dir.subscribe(move |_| o1.lock().push(1));
    let _s2 = dir.subscribe(move |_| o2.lock().push(2));
    dir.announce(svc("a")).unwrap();
    assert_eq!(*order.lock(), vec![1, 2]);
}

#[test]
fn test_panicking_listener_does_not_stop_delivery() {
    let (dir, _) = directory(1_000);
    let _bad = dir.subscribe(|_| panic!("listener failure"));
    let (_sub, events) = recorder(&dir);

    dir.announce(svc("a")).unwrap();
    dir.announce(svc("b")).unwrap();

    assert_eq!(events.lock().len(), 2);
    assert_eq!(dir.len(), 2);
}

#[test]
fn test_unsubscribe_is_idempotent_and_drop_unsubscribes() {
    let (dir, _) = directory(1_000);
    let (sub, events) = recorder(&dir);
    assert_eq!(dir.listener_count(), 1);

    sub.unsubscribe();
    sub.unsubscribe();
    assert!(!sub.is_active());
    assert_eq!(dir.listener_count(), 0);
    dir.announce(svc("a")).unwrap();
    assert!(events.lock().is_empty());

    let (sub2, _) = recorder(&dir);
    assert!(dir.unsubscribe(sub2.id()));
    assert!(!dir.unsubscribe(sub2.id()));
    drop(sub2);

    {
        let (_scoped, _) = recorder(&dir);
        assert_eq!(dir.listener_count(), 1);
    }
    assert_eq!(dir.listener_count(), 0);
}

#[test]
fn test_listener_may_call_back_into_directory() {
    let (dir, _) = directory(1_000);
    let mirror = dir.clone();
    let _sub = dir.subscribe(move |e| {
        if e.kind == RouterEventKind::Added && !e.endpoint.id.starts_with("mirror-") {
            let id = format!("mirror-{}", e.endpoint.id);
            mirror
                .announce(RoutingAnnouncement::new(id, "mirror", "none"))
                .unwrap();
        }
    });
    dir.announce(svc("a")).unwrap();
    assert!(dir.get("mirror-a").is_some());
}

// =============================================================================
// properties
// =============================================================================

proptest! {
    #[test]
    fn prop_announced_at_fixed_updated_at_monotonic(steps in proptest::collection::vec(0u64..500, 1..20)) {
        let (dir, clock) = directory(1_000);
        let first = dir.announce(svc("svc")).unwrap();
        let mut last = first.clone();
        for step in steps {
            clock.advance(step);
            let next = dir.announce(svc("svc")).unwrap();
            prop_assert_eq!(next.announced_at, first.announced_at);
            prop_assert!(next.updated_at >= last.updated_at);
            prop_assert_eq!(next.expires_at.as_millis(), next.updated_at.as_millis() + 1_000);
            last = next;
        }
    }

    #[test]
    fn prop_sweep_liveness(ttl in 1u64..5_000, elapsed in 0u64..10_000) {
        let (dir, clock) = directory(ttl);
        dir.announce(svc("svc")).unwrap();
        clock.advance(elapsed);
        dir.sweep();
        prop_assert_eq!(dir.get("svc").is_some(), elapsed <= ttl);
    }
}
