//! Transport that only logs what it would send.

use crate::domain::{PeerTarget, TransportError};
use crate::ports::PeerTransport;
use async_trait::async_trait;
use mk_02_routing_directory::RoutingEndpoint;
use tracing::debug;

/// Records each propagation in the log and reports success.
///
/// Useful where federation bookkeeping is wanted without a wire transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPeerTransport;

#[async_trait]
impl PeerTransport for LoggingPeerTransport {
    async fn propagate(
        &self,
        origin_router: &str,
        peer: &PeerTarget,
        endpoints: &[RoutingEndpoint],
    ) -> Result<(), TransportError> {
        debug!(
            origin = %origin_router,
            peer_id = %peer.peer_id,
            url = %peer.url,
            endpoint_count = endpoints.len(),
            "propagate.peer"
        );
        Ok(())
    }
}
