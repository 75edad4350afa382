//! # Control Messages
//!
//! Wire format of the worker lifecycle protocol. Every message is carried in
//! a [`ControlEnvelope`] naming the topic it was published on.

use serde::{Deserialize, Serialize};

/// Topic on which a worker announces readiness (or failure to start).
pub const CONTROL_HELLO_TOPIC: &str = "control.hello";

/// Topic on which the executor sends commands to a worker.
pub const CONTROL_COMMAND_TOPIC: &str = "control.cmd";

/// A control-plane message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// The worker constructed and started its module.
    #[serde(rename = "worker.ready")]
    WorkerReady {
        #[serde(rename = "nodeId")]
        node_id: String,
    },

    /// The worker could not construct or start its module.
    #[serde(rename = "worker.error")]
    WorkerError {
        #[serde(rename = "nodeId")]
        node_id: String,
        message: String,
    },

    /// Stop the module and exit.
    #[serde(rename = "shutdown")]
    Shutdown,
}

impl ControlMessage {
    /// The `type` discriminator as it appears on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::WorkerReady { .. } => "worker.ready",
            ControlMessage::WorkerError { .. } => "worker.error",
            ControlMessage::Shutdown => "shutdown",
        }
    }
}

/// A message tagged with the topic it was published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEnvelope {
    pub topic: String,
    pub message: ControlMessage,
}

impl ControlEnvelope {
    pub fn new(topic: impl Into<String>, message: ControlMessage) -> Self {
        Self {
            topic: topic.into(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ready_wire_format() {
        let msg = ControlMessage::WorkerReady {
            node_id: "w1".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "worker.ready", "nodeId": "w1"})
        );
        assert_eq!(msg.kind(), "worker.ready");
    }

    #[test]
    fn test_shutdown_parses_from_wire() {
        let msg: ControlMessage = serde_json::from_value(json!({"type": "shutdown"})).unwrap();
        assert_eq!(msg, ControlMessage::Shutdown);
    }
}
