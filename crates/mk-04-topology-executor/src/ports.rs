//! # Ports
//!
//! Collaborators the executor delegates bookkeeping to. In-memory adapters
//! live in [`crate::adapters`]; embedders can substitute their own.
//!
//! | Port | Role |
//! |------|------|
//! | [`IdentityRegistry`] | Who exists and where they can be reached |
//! | [`NodeGraph`] | Nodes, addressable pipes and the connections between them |
//! | [`ModuleLookup`] | Module name to factory |
//! | [`ExternalWrapperSpawner`] | Launch and supervise an external server |

use crate::domain::{
    EndpointRecord, ExecutorError, ExternalServerManifest, GraphError, Identity, IdentityError,
    NodeDescriptor, ServerManifest,
};
use crate::modules::ModuleFactory;
use crate::process::ExternalWrapper;
use async_trait::async_trait;
use mk_01_pipe_kernel::{Pipe, PipeOptions};

/// Identity registry.
pub trait IdentityRegistry: Send + Sync {
    /// Record a server and assign its identity.
    fn register(&self, manifest: ServerManifest) -> Result<Identity, IdentityError>;

    /// Attach a reachable endpoint to an identity.
    fn register_endpoint(
        &self,
        identity: &Identity,
        endpoint: EndpointRecord,
    ) -> Result<(), IdentityError>;

    /// Forget an identity and its endpoint. Returns whether it was known.
    fn unregister(&self, identity: &Identity) -> bool;
}

/// Node-graph tracker.
///
/// Pipes are addressed symbolically as `node.terminal`, so connections can be
/// declared before the pipes' owners exist.
#[async_trait]
pub trait NodeGraph: Send + Sync {
    fn add_node(&self, descriptor: NodeDescriptor) -> Result<(), GraphError>;

    /// Drop the node entry. Its pipes and connections are untouched.
    fn remove_node(&self, id: &str) -> bool;

    /// Create the pipe at `address`, or return the one already there.
    fn create_pipe(&self, address: &str, options: PipeOptions) -> Result<Pipe, GraphError>;

    /// Forward `from` into `to`. Both pipes must exist.
    fn connect(&self, from: &str, to: &str) -> Result<(), GraphError>;

    /// End the pipe at `address` and detach every connection touching it.
    async fn remove_pipe(&self, address: &str) -> bool;
}

/// Module name to factory.
pub trait ModuleLookup: Send + Sync {
    fn get(&self, name: &str) -> Option<ModuleFactory>;
}

/// Launches an external server and exposes its stdio as pipes.
#[async_trait]
pub trait ExternalWrapperSpawner: Send + Sync {
    async fn spawn(&self, manifest: &ExternalServerManifest)
        -> Result<ExternalWrapper, ExecutorError>;
}
