//! Error types for federation.

use mk_02_routing_directory::RoutingError;
use thiserror::Error;

/// Peer-list resolution failure. Logged and treated as zero peers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("peer discovery failed: {0}")]
pub struct DiscoveryError(pub String);

/// A single propagation call failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(String),

    #[error("peer {peer} rejected endpoint {endpoint}: {reason}")]
    Rejected {
        peer: String,
        endpoint: String,
        reason: String,
    },
}

/// Errors surfaced by federation operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FederationError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
