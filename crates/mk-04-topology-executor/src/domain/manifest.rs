//! # Registration Records
//!
//! What the executor tells its collaborators about each node: a server
//! manifest for the identity registry, a descriptor for the node graph, and
//! the manifest consumed by external wrapper spawners.

use mk_01_pipe_kernel::Capabilities;
use serde::{Deserialize, Serialize};
use shared_types::Metadata;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Direction of a terminal, seen from the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalDirection {
    Input,
    Output,
}

/// A named port on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminal {
    pub name: String,
    pub direction: TerminalDirection,
}

impl Terminal {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: TerminalDirection::Input,
        }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: TerminalDirection::Output,
        }
    }
}

/// Registration handed to the identity registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerManifest {
    pub fqdn: String,
    pub servername: String,
    pub class_hex: String,
    pub owner: String,
    pub terminals: Vec<Terminal>,
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// Identity assigned by the registry on `register`.
///
/// Rendered as `fqdn:servername:classHex:owner:uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an identity can be reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Node entry in the node-graph tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    /// Module name, or server name for external wrappers.
    pub name: String,
    pub terminals: Vec<Terminal>,
    pub capabilities: Vec<String>,
    pub location: String,
}

/// Coarse classification of a module, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleClass {
    Source,
    Transform,
    Output,
    Other,
}

impl ModuleClass {
    #[must_use]
    pub fn from_module_name(name: &str) -> Self {
        if name.contains("Source") || name.contains("Timer") {
            ModuleClass::Source
        } else if name.contains("Transform") || name.contains("Uppercase") {
            ModuleClass::Transform
        } else if name.contains("Sink") || name.contains("Console") {
            ModuleClass::Output
        } else {
            ModuleClass::Other
        }
    }

    #[must_use]
    pub fn class_hex(&self) -> &'static str {
        match self {
            ModuleClass::Source => "0x0001",
            ModuleClass::Transform => "0x0002",
            ModuleClass::Output => "0x0003",
            ModuleClass::Other => "0x0000",
        }
    }

    /// Capability type reported to the identity registry.
    #[must_use]
    pub fn capability_type(&self) -> &'static str {
        match self {
            ModuleClass::Source => "source",
            ModuleClass::Output => "output",
            ModuleClass::Transform | ModuleClass::Other => "transform",
        }
    }
}

/// Description of an external server process to wrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalServerManifest {
    pub servername: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    pub capabilities: Capabilities,
    /// Assigned by the executor when absent.
    #[serde(default)]
    pub uuid: Option<String>,
}

impl ExternalServerManifest {
    pub fn new(servername: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            servername: servername.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            capabilities: Capabilities::new("transform"),
            uuid: None,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Lifecycle of one node.
///
/// ```text
/// configured -> instantiating -> running -> stopped
///                                  |  ^
///                                  v  |
///                               restarting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Configured,
    Instantiating,
    Running,
    Restarting,
    Stopped,
}
