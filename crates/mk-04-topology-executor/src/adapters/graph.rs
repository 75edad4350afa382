//! In-memory node graph backed by a pipe [`Kernel`].

use crate::domain::{GraphError, NodeDescriptor, PortRef};
use crate::ports::NodeGraph;
use async_trait::async_trait;
use mk_01_pipe_kernel::{EdgeHandle, Kernel, Pipe, PipeOptions};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use tracing::{debug, info};

struct GraphConnection {
    from: String,
    to: String,
    edge: EdgeHandle,
}

/// Tracks nodes, named pipes and live connections.
///
/// Each `connect` runs one kernel edge, so a port can feed at most one
/// connection; use [`Kernel::split`] on the pipe for fan-out.
pub struct InMemoryNodeGraph {
    kernel: Kernel,
    nodes: RwLock<BTreeMap<String, NodeDescriptor>>,
    pipes: RwLock<BTreeMap<String, Pipe>>,
    connections: Mutex<Vec<GraphConnection>>,
}

impl InMemoryNodeGraph {
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel,
            nodes: RwLock::new(BTreeMap::new()),
            pipes: RwLock::new(BTreeMap::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// The pipe at `node.terminal`, if created.
    #[must_use]
    pub fn pipe(&self, address: &str) -> Option<Pipe> {
        self.pipes.read().get(address).cloned()
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<NodeDescriptor> {
        self.nodes.read().get(id).cloned()
    }

    #[must_use]
    pub fn nodes(&self) -> Vec<NodeDescriptor> {
        self.nodes.read().values().cloned().collect()
    }

    #[must_use]
    pub fn pipe_addresses(&self) -> Vec<String> {
        self.pipes.read().keys().cloned().collect()
    }

    /// Live connections as `(from, to)`, in the order they were made.
    #[must_use]
    pub fn connections(&self) -> Vec<(String, String)> {
        self.connections
            .lock()
            .iter()
            .map(|c| (c.from.clone(), c.to.clone()))
            .collect()
    }
}

#[async_trait]
impl NodeGraph for InMemoryNodeGraph {
    fn add_node(&self, descriptor: NodeDescriptor) -> Result<(), GraphError> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&descriptor.id) {
            return Err(GraphError::DuplicateNode(descriptor.id));
        }
        debug!(id = %descriptor.id, name = %descriptor.name, "graph.add_node");
        nodes.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    fn remove_node(&self, id: &str) -> bool {
        let removed = self.nodes.write().remove(id).is_some();
        if removed {
            debug!(id = %id, "graph.remove_node");
        }
        removed
    }

    fn create_pipe(&self, address: &str, options: PipeOptions) -> Result<Pipe, GraphError> {
        PortRef::parse(address)?;
        let mut pipes = self.pipes.write();
        if let Some(existing) = pipes.get(address) {
            return Ok(existing.clone());
        }
        let options = PipeOptions {
            label: Some(address.to_string()),
            ..options
        };
        let pipe = self.kernel.create_pipe(options)?;
        pipes.insert(address.to_string(), pipe.clone());
        Ok(pipe)
    }

    fn connect(&self, from: &str, to: &str) -> Result<(), GraphError> {
        let (src, dst) = {
            let pipes = self.pipes.read();
            let src = pipes
                .get(from)
                .cloned()
                .ok_or_else(|| GraphError::UnknownPipe(from.to_string()))?;
            let dst = pipes
                .get(to)
                .cloned()
                .ok_or_else(|| GraphError::UnknownPipe(to.to_string()))?;
            (src, dst)
        };
        let edge = self.kernel.connect(&src, &dst)?;
        info!(from = %from, to = %to, "graph.connect");
        self.connections.lock().push(GraphConnection {
            from: from.to_string(),
            to: to.to_string(),
            edge,
        });
        Ok(())
    }

    async fn remove_pipe(&self, address: &str) -> bool {
        let Some(pipe) = self.pipes.write().remove(address) else {
            return false;
        };
        let touching: Vec<GraphConnection> = {
            let mut connections = self.connections.lock();
            let (touching, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut *connections)
                .into_iter()
                .partition(|c| c.from == address || c.to == address);
            *connections = keep;
            touching
        };
        for connection in touching {
            debug!(from = %connection.from, to = %connection.to, "graph.disconnect");
            connection.edge.detach().await;
        }
        pipe.end();
        true
    }
}
