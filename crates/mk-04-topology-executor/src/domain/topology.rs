//! # Topology
//!
//! Declarative description of the nodes to run and how their terminals are
//! connected.
//!
//! ```yaml
//! nodes:
//!   - id: timer
//!     module: TimerSource
//!     params: { periodMs: 100 }
//!   - id: upper
//!     module: UppercaseTransform
//!     runMode: worker
//! connections:
//!   - from: timer.output
//!     to: upper.input
//! ```

use crate::domain::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a node executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Constructed directly in the executor's runtime.
    #[default]
    Inproc,
    /// On a dedicated OS thread with its own runtime, reached only through
    /// paired channels.
    Worker,
    /// A child OS process bridged through stdio.
    Process,
}

impl RunMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Inproc => "inproc",
            RunMode::Worker => "worker",
            RunMode::Process => "process",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured node. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub id: String,
    pub module: String,
    /// JSON object handed to the module factory.
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
    #[serde(default)]
    pub run_mode: RunMode,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            params: empty_params(),
            run_mode: RunMode::Inproc,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }
}

/// A declared connection between two `node.terminal` ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub from: String,
    pub to: String,
}

impl ConnectionConfig {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Nodes plus connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<NodeConfig>,
    pub connections: Vec<ConnectionConfig>,
}

impl Topology {
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A parsed `node.terminal` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node_id: String,
    pub terminal: String,
}

impl PortRef {
    /// Parse `node.terminal`. Exactly one dot, both halves non-empty.
    pub fn parse(address: &str) -> Result<Self, GraphError> {
        match address.split_once('.') {
            Some((node, terminal))
                if !node.is_empty() && !terminal.is_empty() && !terminal.contains('.') =>
            {
                Ok(Self {
                    node_id: node.to_string(),
                    terminal: terminal.to_string(),
                })
            }
            _ => Err(GraphError::InvalidAddress(address.to_string())),
        }
    }

    pub fn new(node_id: impl Into<String>, terminal: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            terminal: terminal.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.terminal)
    }
}
