//! # Ports
//!
//! Federation depends on two outside collaborators: where the peer list comes
//! from, and how endpoint lists reach a peer.

use crate::domain::{DiscoveryError, PeerTarget, TransportError};
use async_trait::async_trait;
use mk_02_routing_directory::RoutingEndpoint;

/// Supplies peer router URLs.
#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn get_peers(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// Delivers a list of endpoint snapshots to one peer.
///
/// Best-effort. Each call runs on its own task, so a slow peer never holds up
/// a propagation tick.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn propagate(
        &self,
        origin_router: &str,
        peer: &PeerTarget,
        endpoints: &[RoutingEndpoint],
    ) -> Result<(), TransportError>;
}
