//! Topology documents: parsing and structural validation.
//!
//! A document whose first non-blank character is `{` or `[` is read as JSON,
//! anything else as YAML.

use crate::domain::{PortRef, Topology, TopologyError};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Parse and validate a topology document.
pub fn parse_topology(text: &str) -> Result<Topology, TopologyError> {
    let trimmed = text.trim_start();
    let topology: Topology = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| TopologyError::Parse(e.to_string()))?
    } else {
        serde_yaml::from_str(text).map_err(|e| TopologyError::Parse(e.to_string()))?
    };
    validate_topology(&topology)?;
    Ok(topology)
}

/// Read, parse and validate a topology file.
pub fn load_topology_file(path: impl AsRef<Path>) -> Result<Topology, TopologyError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let topology = parse_topology(&text)?;
    debug!(
        path = %path.display(),
        nodes = topology.nodes.len(),
        connections = topology.connections.len(),
        "topology loaded"
    );
    Ok(topology)
}

/// Check ids, module names and connection endpoints.
///
/// Node ids must be non-empty, dot-free and unique. Every connection must
/// reference `node.terminal` ports of declared nodes.
pub fn validate_topology(topology: &Topology) -> Result<(), TopologyError> {
    let mut ids = BTreeSet::new();
    for node in &topology.nodes {
        if node.id.is_empty() {
            return Err(TopologyError::Invalid("node id must not be empty".into()));
        }
        if node.id.contains('.') {
            return Err(TopologyError::Invalid(format!(
                "node id {} must not contain '.'",
                node.id
            )));
        }
        if node.module.is_empty() {
            return Err(TopologyError::Invalid(format!(
                "node {} has no module",
                node.id
            )));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(TopologyError::Invalid(format!(
                "duplicate node id {}",
                node.id
            )));
        }
    }

    for connection in &topology.connections {
        for address in [&connection.from, &connection.to] {
            let port =
                PortRef::parse(address).map_err(|e| TopologyError::Invalid(e.to_string()))?;
            if !ids.contains(port.node_id.as_str()) {
                return Err(TopologyError::Invalid(format!(
                    "connection {} -> {} references unknown node {}",
                    connection.from, connection.to, port.node_id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionConfig, NodeConfig, RunMode};
    use serde_json::json;
    use std::io::Write;

    const YAML: &str = r#"
nodes:
  - id: timer
    module: TimerSource
    params:
      periodMs: 100
  - id: upper
    module: UppercaseTransform
    runMode: worker
  - id: sink
    module: ConsoleSink
connections:
  - from: timer.output
    to: upper.input
  - from: upper.output
    to: sink.input
"#;

    #[test]
    fn test_parse_yaml() {
        let topology = parse_topology(YAML).unwrap();
        assert_eq!(topology.nodes.len(), 3);
        assert_eq!(topology.nodes[0].params, json!({"periodMs": 100}));
        assert_eq!(topology.nodes[1].run_mode, RunMode::Worker);
        assert_eq!(topology.nodes[2].run_mode, RunMode::Inproc);
        assert_eq!(topology.nodes[2].params, json!({}));
        assert_eq!(
            topology.connections[1],
            ConnectionConfig::new("upper.output", "sink.input")
        );
    }

    #[test]
    fn test_parse_json() {
        let text = r#"
            {"nodes": [{"id": "a", "module": "TimerSource", "runMode": "process"}],
             "connections": []}"#;
        let topology = parse_topology(text).unwrap();
        assert_eq!(topology.nodes[0].run_mode, RunMode::Process);
    }

    #[test]
    fn test_missing_sections_rejected() {
        assert!(matches!(
            parse_topology("nodes: []"),
            Err(TopologyError::Parse(_))
        ));
        assert!(matches!(
            parse_topology(r#"{"connections": []}"#),
            Err(TopologyError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_run_mode_rejected() {
        let text = r#"{"nodes": [{"id": "a", "module": "M", "runMode": "cluster"}], "connections": []}"#;
        assert!(matches!(parse_topology(text), Err(TopologyError::Parse(_))));
    }

    #[test]
    fn test_validation_errors() {
        let dup = Topology {
            nodes: vec![NodeConfig::new("a", "M"), NodeConfig::new("a", "M")],
            connections: vec![],
        };
        assert!(matches!(validate_topology(&dup), Err(TopologyError::Invalid(m)) if m.contains("duplicate")));

        let dotted = Topology {
            nodes: vec![NodeConfig::new("a.b", "M")],
            connections: vec![],
        };
        assert!(validate_topology(&dotted).is_err());

        let no_module = Topology {
            nodes: vec![NodeConfig::new("a", "")],
            connections: vec![],
        };
        assert!(validate_topology(&no_module).is_err());

        let dangling = Topology {
            nodes: vec![NodeConfig::new("a", "M")],
            connections: vec![ConnectionConfig::new("a.output", "ghost.input")],
        };
        assert!(matches!(validate_topology(&dangling), Err(TopologyError::Invalid(m)) if m.contains("ghost")));

        let malformed = Topology {
            nodes: vec![NodeConfig::new("a", "M")],
            connections: vec![ConnectionConfig::new("a", "a.input")],
        };
        assert!(validate_topology(&malformed).is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let topology = load_topology_file(file.path()).unwrap();
        assert!(topology.node("upper").is_some());

        assert!(matches!(
            load_topology_file("/no/such/topology.yml"),
            Err(TopologyError::Io { .. })
        ));
    }
}
