//! In-memory identity registry.

use crate::domain::{EndpointRecord, Identity, IdentityError, ServerManifest};
use crate::ports::IdentityRegistry;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// One registered server.
#[derive(Debug, Clone, PartialEq)]
pub struct GuestEntry {
    pub identity: Identity,
    pub manifest: ServerManifest,
    pub endpoint: Option<EndpointRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryIdentityRegistry {
    entries: RwLock<BTreeMap<Identity, GuestEntry>>,
}

impl InMemoryIdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn list(&self) -> Vec<GuestEntry> {
        self.entries.read().values().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, identity: &Identity) -> Option<GuestEntry> {
        self.entries.read().get(identity).cloned()
    }

    /// Entries whose server name is `servername`.
    #[must_use]
    pub fn find_by_servername(&self, servername: &str) -> Vec<GuestEntry> {
        self.entries
            .read()
            .values()
            .filter(|e| e.manifest.servername == servername)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl IdentityRegistry for InMemoryIdentityRegistry {
    fn register(&self, manifest: ServerManifest) -> Result<Identity, IdentityError> {
        if manifest.servername.is_empty() {
            return Err(IdentityError::InvalidManifest(
                "servername must not be empty".into(),
            ));
        }
        let uuid = manifest
            .uuid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let identity = Identity(format!(
            "{}:{}:{}:{}:{}",
            manifest.fqdn, manifest.servername, manifest.class_hex, manifest.owner, uuid
        ));
        debug!(identity = %identity, terminals = manifest.terminals.len(), "identity.register");
        self.entries.write().insert(
            identity.clone(),
            GuestEntry {
                identity: identity.clone(),
                manifest,
                endpoint: None,
            },
        );
        Ok(identity)
    }

    fn register_endpoint(
        &self,
        identity: &Identity,
        endpoint: EndpointRecord,
    ) -> Result<(), IdentityError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(identity)
            .ok_or_else(|| IdentityError::UnknownIdentity(identity.to_string()))?;
        debug!(
            identity = %identity,
            kind = %endpoint.kind,
            coordinates = %endpoint.coordinates,
            "identity.register_endpoint"
        );
        entry.endpoint = Some(endpoint);
        Ok(())
    }

    fn unregister(&self, identity: &Identity) -> bool {
        let removed = self.entries.write().remove(identity).is_some();
        if removed {
            debug!(identity = %identity, "identity.unregister");
        }
        removed
    }
}
