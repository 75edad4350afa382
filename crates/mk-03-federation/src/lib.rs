//! # Federation
//!
//! Keeps routing directories on several instances in sync.
//!
//! Each instance owns the endpoints announced locally. On every tick it sends
//! that set to each active peer, and peers inject what they receive into
//! their own directory tagged with `federationSource`. Tagged endpoints never
//! count as local, so nothing is echoed back to its origin.
//!
//! ```text
//!   router-a                                   router-b
//!  ┌──────────────┐   propagate(local set)   ┌──────────────┐
//!  │  directory   │ ───────────────────────> │  directory   │
//!  │  local: {x}  │                          │  local: {}   │
//!  └──────────────┘                          │  x (src = a) │
//!                                            └──────────────┘
//! ```
//!
//! ## Collaborators
//!
//! | Port | Adapters |
//! |------|----------|
//! | [`PeerSource`] | [`ConfigPeerSource`] |
//! | [`PeerTransport`] | [`LoggingPeerTransport`], [`InMemoryMesh`] |

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{ConfigPeerSource, InMemoryMesh, LoggingPeerTransport};
pub use domain::{
    peer_id_from_url, DiscoveryError, FederationConfig, FederationError, FederationStatus,
    PeerConnection, PeerTarget, PropagationReport, TransportError,
};
pub use ports::{PeerSource, PeerTransport};
pub use service::{Federation, WeakFederation};
