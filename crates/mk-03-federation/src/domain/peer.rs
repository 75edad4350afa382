//! # Peers

use serde::{Deserialize, Serialize};
use shared_types::Timestamp;

/// URL schemes whose host token names the peer.
const HOST_SCHEMES: [&str; 5] = ["tcp://", "ws://", "wss://", "http://", "https://"];

/// Derive a peer id from its URL.
///
/// `tcp://router-1:30020` yields `router-1`. Strings without a known scheme,
/// or with an empty host, are used verbatim.
#[must_use]
pub fn peer_id_from_url(url: &str) -> String {
    HOST_SCHEMES
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .and_then(|rest| rest.split([':', '/']).next())
        .filter(|host| !host.is_empty())
        .unwrap_or(url)
        .to_string()
}

/// A known peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConnection {
    pub peer_id: String,
    pub url: String,
    pub last_seen: Timestamp,
    pub active: bool,
    pub consecutive_failures: u32,
}

impl PeerConnection {
    pub fn new(url: impl Into<String>, now: Timestamp) -> Self {
        let url = url.into();
        Self {
            peer_id: peer_id_from_url(&url),
            url,
            last_seen: now,
            active: true,
            consecutive_failures: 0,
        }
    }

    #[must_use]
    pub fn target(&self) -> PeerTarget {
        PeerTarget {
            peer_id: self.peer_id.clone(),
            url: self.url.clone(),
        }
    }
}

/// Where a propagation call is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTarget {
    pub peer_id: String,
    pub url: String,
}

/// Snapshot for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationStatus {
    pub router_id: String,
    pub running: bool,
    pub peer_count: usize,
    pub local_endpoint_count: usize,
    pub peers: Vec<PeerConnection>,
}

/// Outcome of one propagation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Local endpoints included in the tick.
    pub endpoint_count: usize,
    /// Peers a propagation call was dispatched to.
    pub dispatched_to: Vec<String>,
}
