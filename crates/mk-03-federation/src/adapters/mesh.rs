//! In-process federation mesh.
//!
//! Federations sharing one mesh deliver to each other directly: a propagation
//! to peer `b` calls `receive_from_peer` on the federation that joined as `b`.
//! Peers can be marked unreachable to exercise failure handling.

use crate::domain::{PeerTarget, TransportError};
use crate::ports::PeerTransport;
use crate::service::{Federation, WeakFederation};
use async_trait::async_trait;
use mk_02_routing_directory::RoutingEndpoint;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct InMemoryMesh {
    members: RwLock<HashMap<String, WeakFederation>>,
    unreachable: RwLock<HashSet<String>>,
}

impl InMemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `federation` reachable as its router id.
    pub fn join(&self, federation: &Federation) {
        self.members
            .write()
            .insert(federation.router_id().to_string(), federation.downgrade());
    }

    pub fn leave(&self, router_id: &str) {
        self.members.write().remove(router_id);
    }

    /// Simulate a partition towards `router_id`.
    pub fn set_reachable(&self, router_id: &str, reachable: bool) {
        let mut unreachable = self.unreachable.write();
        if reachable {
            unreachable.remove(router_id);
        } else {
            unreachable.insert(router_id.to_string());
        }
    }
}

#[async_trait]
impl PeerTransport for InMemoryMesh {
    async fn propagate(
        &self,
        origin_router: &str,
        peer: &PeerTarget,
        endpoints: &[RoutingEndpoint],
    ) -> Result<(), TransportError> {
        if self.unreachable.read().contains(&peer.peer_id) {
            return Err(TransportError::Unreachable(peer.peer_id.clone()));
        }
        let target = self
            .members
            .read()
            .get(&peer.peer_id)
            .and_then(WeakFederation::upgrade)
            .ok_or_else(|| TransportError::Unreachable(peer.peer_id.clone()))?;

        for endpoint in endpoints {
            target
                .receive_from_peer(origin_router, endpoint.to_announcement())
                .map_err(|e| TransportError::Rejected {
                    peer: peer.peer_id.clone(),
                    endpoint: endpoint.id.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}
