//! Domain layer: peers, status reports, configuration and errors.

pub mod config;
pub mod errors;
pub mod peer;

pub use config::FederationConfig;
pub use errors::{DiscoveryError, FederationError, TransportError};
pub use peer::{peer_id_from_url, FederationStatus, PeerConnection, PeerTarget, PropagationReport};
