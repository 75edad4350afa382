//! Error types for the topology executor.

use mk_01_pipe_kernel::{KernelError, PipeError};
use thiserror::Error;

/// Errors surfaced by executor operations.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Nothing loaded, unknown module, malformed manifest.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No instantiated node with this id.
    #[error("node not found: {0}")]
    NotFound(String),

    /// A worker or child process failed to start, reported an error, or
    /// exited unexpectedly.
    #[error("isolation fault in node {node_id}: {reason}")]
    IsolationFault { node_id: String, reason: String },

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Module(#[from] ModuleError),
}

impl From<PipeError> for ExecutorError {
    fn from(e: PipeError) -> Self {
        ExecutorError::Kernel(KernelError::Pipe(e))
    }
}

impl ExecutorError {
    pub(crate) fn isolation(node_id: &str, reason: impl Into<String>) -> Self {
        ExecutorError::IsolationFault {
            node_id: node_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from the node-graph tracker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A port reference is not of the form `node.terminal`.
    #[error("invalid port address: {0}")]
    InvalidAddress(String),

    #[error("no pipe at {0}")]
    UnknownPipe(String),

    #[error("node {0} is already tracked")]
    DuplicateNode(String),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Errors from the identity registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

/// Errors from loading or validating a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse topology: {0}")]
    Parse(String),

    #[error("invalid topology: {0}")]
    Invalid(String),
}

/// Errors from module construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("invalid params for {module}: {reason}")]
    InvalidParams { module: String, reason: String },

    #[error("module {module} failed to construct: {reason}")]
    Construction { module: String, reason: String },

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Errors from loading runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value for {key}: {value}")]
    Env { key: String, value: String },
}
