//! # Endpoints and Events

use serde::{Deserialize, Serialize};
use shared_types::{Metadata, Timestamp};

/// Metadata key naming the peer an endpoint was received from.
pub const FEDERATION_SOURCE_KEY: &str = "federationSource";

/// Input to [`crate::RoutingDirectory::announce`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingAnnouncement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl RoutingAnnouncement {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        coordinates: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            coordinates: coordinates.into(),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A live endpoint as held by the directory.
///
/// `expires_at == updated_at + ttl` as of the last announce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingEndpoint {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub announced_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
}

impl RoutingEndpoint {
    /// The peer this endpoint was received from, if any.
    #[must_use]
    pub fn federation_source(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(FEDERATION_SOURCE_KEY))
            .and_then(|v| v.as_str())
    }

    /// Strip the timestamps, e.g. to forward the endpoint elsewhere.
    #[must_use]
    pub fn to_announcement(&self) -> RoutingAnnouncement {
        RoutingAnnouncement {
            id: self.id.clone(),
            kind: self.kind.clone(),
            coordinates: self.coordinates.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// What happened to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterEventKind {
    Added,
    Updated,
    Removed,
}

impl RouterEventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterEventKind::Added => "added",
            RouterEventKind::Updated => "updated",
            RouterEventKind::Removed => "removed",
        }
    }
}

/// A change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterEvent {
    #[serde(rename = "type")]
    pub kind: RouterEventKind,
    /// Snapshot of the endpoint (its last state, for removals).
    pub endpoint: RoutingEndpoint,
    pub timestamp: Timestamp,
}

/// Running sweeper counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepStats {
    pub total_sweeps: u64,
    pub total_removed: u64,
    pub last_sweep_time: Option<Timestamp>,
}
