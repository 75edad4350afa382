//! # Federation Service
//!
//! Replicates locally owned endpoints to peers and ingests the reverse
//! stream without creating propagation loops.
//!
//! ## Ownership Tracking
//!
//! The local-endpoint set is fed only by directory events:
//!
//! - `added`/`updated` without `federationSource` metadata: the id is local.
//! - `added`/`updated` with `federationSource`: the id belongs to a peer and
//!   is dropped from the local set.
//! - `removed`: the id is dropped.
//!
//! ## Peer Deactivation
//!
//! A peer whose propagation call fails `max_consecutive_failures` times in a
//! row is marked inactive and skipped by later ticks. An announcement received
//! from it, or its reappearance in [`Federation::refresh_peers`], reactivates it.
//!
//! ## Restarts
//!
//! Every `start` and `stop` bumps a generation counter. A `start` that was
//! overtaken by a `stop` while discovery was in flight sees a newer
//! generation and backs out without touching peers or the propagation task.

use crate::domain::{
    FederationConfig, FederationError, FederationStatus, PeerConnection, PropagationReport,
};
use crate::ports::{PeerSource, PeerTransport};
use mk_02_routing_directory::{
    RouterEventKind, RoutingAnnouncement, RoutingDirectory, RoutingEndpoint, Subscription,
    FEDERATION_SOURCE_KEY,
};
use mk_telemetry::{
    FEDERATION_PEERS_ACTIVE, FEDERATION_PEER_FAILURES, FEDERATION_PROPAGATIONS,
    FEDERATION_RECEIVED,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Federation handle. Clones share state.
#[derive(Clone)]
pub struct Federation {
    inner: Arc<FederationInner>,
}

/// Non-owning federation handle, for transports that deliver back into it.
#[derive(Clone)]
pub struct WeakFederation {
    inner: Weak<FederationInner>,
}

impl WeakFederation {
    #[must_use]
    pub fn upgrade(&self) -> Option<Federation> {
        self.inner.upgrade().map(|inner| Federation { inner })
    }
}

struct FederationInner {
    config: FederationConfig,
    directory: RoutingDirectory,
    peer_source: Arc<dyn PeerSource>,
    transport: Arc<dyn PeerTransport>,
    local_endpoints: Arc<Mutex<BTreeSet<String>>>,
    state: Mutex<FederationState>,
}

#[derive(Default)]
struct FederationState {
    running: bool,
    generation: u64,
    subscription: Option<Subscription>,
    propagate_task: Option<JoinHandle<()>>,
    peers: BTreeMap<String, PeerConnection>,
}

impl Federation {
    pub fn new(
        config: FederationConfig,
        directory: RoutingDirectory,
        peer_source: Arc<dyn PeerSource>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            inner: Arc::new(FederationInner {
                config,
                directory,
                peer_source,
                transport,
                local_endpoints: Arc::new(Mutex::new(BTreeSet::new())),
                state: Mutex::new(FederationState::default()),
            }),
        }
    }

    #[must_use]
    pub fn router_id(&self) -> &str {
        &self.inner.config.router_id
    }

    #[must_use]
    pub fn directory(&self) -> &RoutingDirectory {
        &self.inner.directory
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakFederation {
        WeakFederation {
            inner: Arc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Subscribe to the directory, discover peers, propagate once, then keep
    /// propagating every `propagate_interval_ms`. Idempotent while running.
    ///
    /// Must be called inside a tokio runtime. Discovery failures are logged
    /// and do not fail `start`.
    pub async fn start(&self) {
        let generation = {
            let mut state = self.inner.state.lock();
            if state.running {
                return;
            }
            state.running = true;
            state.generation += 1;
            let local = Arc::clone(&self.inner.local_endpoints);
            state.subscription = Some(self.inner.directory.subscribe(move |event| {
                let id = &event.endpoint.id;
                match event.kind {
                    RouterEventKind::Added | RouterEventKind::Updated => {
                        if event.endpoint.federation_source().is_none() {
                            if local.lock().insert(id.clone()) {
                                debug!(id = %id, event = event.kind.as_str(), "local.change");
                            }
                        } else {
                            local.lock().remove(id);
                        }
                    }
                    RouterEventKind::Removed => {
                        if local.lock().remove(id) {
                            debug!(id = %id, "local.removed");
                        }
                    }
                }
            }));
            state.generation
        };
        info!(router_id = %self.router_id(), generation, "federation start");

        if self.discover_peers(Some(generation)).await.is_none() {
            debug!(router_id = %self.router_id(), generation, "federation start superseded");
            return;
        }
        self.propagate_now();

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.propagate_interval();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The initial propagation already ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Federation { inner }.propagate_now();
            }
        });

        let mut state = self.inner.state.lock();
        if state.running && state.generation == generation {
            state.propagate_task = Some(task);
            info!(
                router_id = %self.router_id(),
                peer_count = state.peers.len(),
                "federation started"
            );
        } else {
            task.abort();
        }
    }

    /// Unsubscribe, cancel propagation, forget peers and local endpoints.
    /// Idempotent.
    pub fn stop(&self) {
        let (subscription, task) = {
            let mut state = self.inner.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.generation += 1;
            FEDERATION_PEERS_ACTIVE.sub(active_count(&state.peers));
            state.peers.clear();
            (state.subscription.take(), state.propagate_task.take())
        };
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        if let Some(task) = task {
            task.abort();
        }
        self.inner.local_endpoints.lock().clear();
        info!(router_id = %self.router_id(), "federation stopped");
    }

    /// Re-run discovery: add new peers and reactivate listed inactive ones.
    ///
    /// Returns the number of known peers afterwards.
    pub async fn refresh_peers(&self) -> usize {
        self.discover_peers(None).await.unwrap_or_default()
    }

    /// Merge discovered peers. With `expected` set, returns `None` and
    /// changes nothing if the generation moved on during the lookup.
    async fn discover_peers(&self, expected: Option<u64>) -> Option<usize> {
        let discovered = self.inner.peer_source.get_peers().await;

        let now = self.inner.directory.now();
        let mut state = self.inner.state.lock();
        if expected.is_some_and(|g| g != state.generation) {
            return None;
        }
        let urls = match discovered {
            Ok(urls) => urls,
            Err(e) => {
                error!(router_id = %self.router_id(), error = %e, "peer.discovery.error");
                return Some(state.peers.len());
            }
        };
        for url in urls {
            let peer = PeerConnection::new(url, now);
            if peer.peer_id == self.inner.config.router_id {
                debug!(url = %peer.url, "peer.skip-self");
                continue;
            }
            match state.peers.get_mut(&peer.peer_id) {
                Some(existing) => {
                    if !existing.active {
                        existing.active = true;
                        existing.consecutive_failures = 0;
                        FEDERATION_PEERS_ACTIVE.inc();
                        info!(peer_id = %existing.peer_id, "peer.reactivated");
                    }
                }
                None => {
                    info!(peer_id = %peer.peer_id, url = %peer.url, "peer.discovered");
                    FEDERATION_PEERS_ACTIVE.inc();
                    state.peers.insert(peer.peer_id.clone(), peer);
                }
            }
        }
        Some(state.peers.len())
    }

    /// Locally owned endpoints that are still live in the directory.
    #[must_use]
    pub fn local_endpoints(&self) -> Vec<RoutingEndpoint> {
        let local = self.inner.local_endpoints.lock().clone();
        self.inner
            .directory
            .list()
            .into_iter()
            .filter(|e| local.contains(&e.id))
            .collect()
    }

    /// Run one propagation tick now.
    ///
    /// Sends the local endpoints to every active peer, each on its own task.
    /// Nothing is sent when there are no local endpoints.
    pub fn propagate_now(&self) -> PropagationReport {
        let endpoints = self.local_endpoints();
        if endpoints.is_empty() {
            debug!(reason = "no-local-endpoints", "propagate.skip");
            return PropagationReport::default();
        }

        let targets: Vec<_> = self
            .inner
            .state
            .lock()
            .peers
            .values()
            .filter(|p| p.active)
            .map(PeerConnection::target)
            .collect();

        debug!(
            endpoint_count = endpoints.len(),
            peer_count = targets.len(),
            "propagate.start"
        );

        let endpoints = Arc::new(endpoints);
        let mut report = PropagationReport {
            endpoint_count: endpoints.len(),
            dispatched_to: Vec::with_capacity(targets.len()),
        };
        for target in targets {
            report.dispatched_to.push(target.peer_id.clone());
            let transport = Arc::clone(&self.inner.transport);
            let endpoints = Arc::clone(&endpoints);
            let weak = Arc::downgrade(&self.inner);
            let origin = self.inner.config.router_id.clone();
            tokio::spawn(async move {
                let result = transport.propagate(&origin, &target, &endpoints).await;
                if let Some(inner) = weak.upgrade() {
                    Federation { inner }.record_outcome(&target.peer_id, result.map_err(|e| e.to_string()));
                }
            });
        }
        report
    }

    fn record_outcome(&self, peer_id: &str, result: Result<(), String>) {
        let max = self.inner.config.max_consecutive_failures;
        let mut state = self.inner.state.lock();
        let Some(peer) = state.peers.get_mut(peer_id) else {
            return;
        };
        match result {
            Ok(()) => {
                FEDERATION_PROPAGATIONS.with_label_values(&["success"]).inc();
                peer.consecutive_failures = 0;
            }
            Err(reason) => {
                FEDERATION_PROPAGATIONS.with_label_values(&["failed"]).inc();
                peer.consecutive_failures = peer.consecutive_failures.saturating_add(1);
                warn!(
                    peer_id = %peer_id,
                    failures = peer.consecutive_failures,
                    error = %reason,
                    "propagate.peer.failed"
                );
                if max > 0 && peer.active && peer.consecutive_failures >= max {
                    peer.active = false;
                    FEDERATION_PEER_FAILURES.inc();
                    FEDERATION_PEERS_ACTIVE.dec();
                    warn!(peer_id = %peer_id, "peer.deactivated");
                }
            }
        }
    }

    /// Inject an announcement received from `peer_id` into the local
    /// directory, tagged with `federationSource = peer_id`.
    ///
    /// Refreshes the peer's `last_seen` and reactivates it if it was inactive.
    pub fn receive_from_peer(
        &self,
        peer_id: &str,
        announcement: RoutingAnnouncement,
    ) -> Result<RoutingEndpoint, FederationError> {
        if peer_id.is_empty() {
            return Err(FederationError::InvalidArgument(
                "receive_from_peer requires a peer id".into(),
            ));
        }
        let mut tagged = announcement;
        tagged
            .metadata
            .get_or_insert_with(Default::default)
            .insert(FEDERATION_SOURCE_KEY.to_string(), peer_id.into());

        debug!(peer_id = %peer_id, id = %tagged.id, kind = %tagged.kind, "receive.peer");
        let endpoint = self.inner.directory.announce(tagged)?;
        FEDERATION_RECEIVED.inc();

        let now = self.inner.directory.now();
        let mut state = self.inner.state.lock();
        if let Some(peer) = state.peers.get_mut(peer_id) {
            peer.last_seen = now;
            peer.consecutive_failures = 0;
            if !peer.active {
                peer.active = true;
                FEDERATION_PEERS_ACTIVE.inc();
                info!(peer_id = %peer_id, "peer.reactivated");
            }
        }
        Ok(endpoint)
    }

    #[must_use]
    pub fn status(&self) -> FederationStatus {
        let local_endpoint_count = self.inner.local_endpoints.lock().len();
        let state = self.inner.state.lock();
        FederationStatus {
            router_id: self.inner.config.router_id.clone(),
            running: state.running,
            peer_count: state.peers.len(),
            local_endpoint_count,
            peers: state.peers.values().cloned().collect(),
        }
    }
}

impl Drop for FederationInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        // The gauge is shared by every federation in the process.
        FEDERATION_PEERS_ACTIVE.sub(active_count(&state.peers));
        if let Some(task) = state.propagate_task.take() {
            task.abort();
        }
    }
}

fn active_count(peers: &BTreeMap<String, PeerConnection>) -> i64 {
    peers.values().filter(|p| p.active).count() as i64
}
