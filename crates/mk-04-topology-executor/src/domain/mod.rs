//! Domain layer: topology model, registration records, errors.

pub mod errors;
pub mod manifest;
pub mod topology;

pub use errors::{
    ConfigError, ExecutorError, GraphError, IdentityError, ModuleError, TopologyError,
};
pub use manifest::{
    EndpointRecord, ExternalServerManifest, Identity, ModuleClass, NodeDescriptor, NodeState,
    ServerManifest, Terminal, TerminalDirection,
};
pub use topology::{ConnectionConfig, NodeConfig, PortRef, RunMode, Topology};
