//! # Topology Executor
//!
//! Loads a declarative topology of nodes and connections, runs each node in
//! its configured isolation mode, and wires them together through pipes.
//!
//! ```text
//!            topology.yml
//!                 │ load / up
//!                 v
//!  ┌──────────────────────────────┐
//!  │      TopologyExecutor        │──> IdentityRegistry (who exists)
//!  │                              │──> NodeGraph        (pipes, connections)
//!  │  inproc   worker   process   │──> RoutingDirectory (optional)
//!  └────┬────────┬─────────┬──────┘
//!       │        │         │
//!    Module   thread +   child +
//!             channels   stdio
//! ```
//!
//! ## Run modes
//!
//! | Mode | Where | Reached through |
//! |------|-------|-----------------|
//! | `inproc` | executor runtime | the module's pipes |
//! | `worker` | dedicated thread and runtime | paired channels + control bus |
//! | `process` | child OS process | stdin / stdout |
//!
//! ## Collaborators
//!
//! | Port | Adapter |
//! |------|---------|
//! | [`IdentityRegistry`] | [`InMemoryIdentityRegistry`] |
//! | [`NodeGraph`] | [`InMemoryNodeGraph`] |
//! | [`ModuleLookup`] | [`ModuleRegistry`] |
//! | [`ExternalWrapperSpawner`] | [`ProcessWrapperSpawner`] |

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod loader;
pub mod modules;
pub mod ports;
pub mod process;
pub mod service;
pub mod worker;

pub use adapters::{GuestEntry, InMemoryIdentityRegistry, InMemoryNodeGraph, ProcessWrapperSpawner};
pub use config::{ExecutorConfig, RuntimeConfig};
pub use domain::{
    ConfigError, ConnectionConfig, EndpointRecord, ExecutorError, ExternalServerManifest,
    GraphError, Identity, IdentityError, ModuleClass, ModuleError, NodeConfig, NodeDescriptor,
    NodeState, PortRef, RunMode, ServerManifest, Terminal, TerminalDirection, Topology,
    TopologyError,
};
pub use loader::{load_topology_file, parse_topology, validate_topology};
pub use modules::{
    parse_params, ConsoleSink, Module, ModuleFactory, ModuleRegistry, TimerSource,
    UppercaseTransform, CONSOLE_HISTORY_LIMIT,
};
pub use ports::{ExternalWrapperSpawner, IdentityRegistry, ModuleLookup, NodeGraph};
pub use process::{ExternalWrapper, ProcessExit, ProcessNode, ProcessSpec, StderrMode};
pub use service::TopologyExecutor;
pub use worker::{run_worker, WorkerNode, WorkerSpawn};
