//! # Topology Executor
//!
//! Turns a loaded [`Topology`] into running nodes and tears them down again.
//!
//! ## Bring-up
//!
//! 1. Instantiate every node in declaration order: build the module in its
//!    run mode, register its identity and endpoint, add it to the node graph,
//!    and wire its pipes to the graph pipes `<id>.input` / `<id>.output`.
//!    Worker nodes complete their readiness handshake here.
//! 2. Apply the declared connections between graph pipes.
//! 3. Start every node.
//!
//! Any failure rolls back what was already brought up.
//!
//! ## Restart
//!
//! A node is torn down and rebuilt from its stored config. Its graph pipes
//! stay in place, so declared connections survive the restart. A chunk that
//! was mid-flight on the node's own wiring when it was detached is dropped.


use crate::config::ExecutorConfig;
use crate::domain::{
    EndpointRecord, ExecutorError, ExternalServerManifest, Identity, ModuleClass, NodeConfig,
    NodeDescriptor, NodeState, RunMode, ServerManifest, Terminal, Topology,
};
use crate::loader::validate_topology;
use crate::modules::Module;
use crate::ports::{ExternalWrapperSpawner, IdentityRegistry, ModuleLookup, NodeGraph};
use crate::process::{ExternalWrapper, ProcessNode, ProcessSpec, StderrMode};
use crate::worker::WorkerNode;
use mk_01_pipe_kernel::{Capabilities, EdgeHandle, Kernel, Pipe, PipeOptions};
use mk_02_routing_directory::{RoutingAnnouncement, RoutingDirectory};
use mk_telemetry::{EXECUTOR_NODES_RUNNING, EXECUTOR_NODE_RESTARTS};
use shared_types::Metadata;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// =============================================================================
// MODULE HANDLES
// =============================================================================

/// A built node, whichever side of an isolation boundary it runs on.
enum ModuleHandle {
    InProc(Box<dyn Module>),
    Worker(WorkerNode),
    Process(ProcessNode),
}

impl ModuleHandle {
    fn input_pipe(&self) -> Option<Pipe> {
        match self {
            ModuleHandle::InProc(module) => module.input_pipe(),
            ModuleHandle::Worker(worker) => Some(worker.input_pipe()),
            ModuleHandle::Process(process) => Some(process.input_pipe()),
        }
    }

    fn output_pipe(&self) -> Option<Pipe> {
        match self {
            ModuleHandle::InProc(module) => module.output_pipe(),
            ModuleHandle::Worker(worker) => Some(worker.output_pipe()),
            ModuleHandle::Process(process) => Some(process.output_pipe()),
        }
    }

    /// Workers and processes are already running once built.
    fn start(&self) {
        if let ModuleHandle::InProc(module) = self {
            module.start();
        }
    }

    async fn stop(&self, grace: Duration) {
        match self {
            ModuleHandle::InProc(module) => module.stop(),
            ModuleHandle::Worker(worker) => {
                worker.shutdown(grace).await;
            }
            ModuleHandle::Process(process) => {
                process.shutdown(grace).await;
            }
        }
    }
}

struct NodeInstance {
    config: NodeConfig,
    handle: ModuleHandle,
    identity: Option<Identity>,
    in_graph: bool,
    announced: bool,
    running: bool,
    /// Edges between the module's pipes and its graph pipes.
    wiring: Vec<EdgeHandle>,
    graph_pipes: Vec<String>,
}

impl NodeInstance {
    fn new(config: NodeConfig, handle: ModuleHandle) -> Self {
        Self {
            config,
            handle,
            identity: None,
            in_graph: false,
            announced: false,
            running: false,
            wiring: Vec::new(),
            graph_pipes: Vec::new(),
        }
    }
}

fn coordinates(node_id: &str) -> String {
    format!("node:{node_id}")
}

fn node_metadata(node: &NodeConfig) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("module".into(), node.module.clone().into());
    metadata.insert("runMode".into(), node.run_mode.as_str().into());
    metadata
}

// =============================================================================
// EXECUTOR
// =============================================================================

pub struct TopologyExecutor {
    kernel: Kernel,
    identity: Arc<dyn IdentityRegistry>,
    graph: Arc<dyn NodeGraph>,
    modules: Arc<dyn ModuleLookup>,
    wrappers: Option<Arc<dyn ExternalWrapperSpawner>>,
    router: Option<RoutingDirectory>,
    config: ExecutorConfig,
    topology: Option<Topology>,
    /// Instantiated nodes in bring-up order.
    instances: Vec<NodeInstance>,
    states: BTreeMap<String, NodeState>,
}

impl TopologyExecutor {
    pub fn new(
        kernel: Kernel,
        identity: Arc<dyn IdentityRegistry>,
        graph: Arc<dyn NodeGraph>,
        modules: Arc<dyn ModuleLookup>,
    ) -> Self {
        Self {
            kernel,
            identity,
            graph,
            modules,
            wrappers: None,
            router: None,
            config: ExecutorConfig::default(),
            topology: None,
            instances: Vec::new(),
            states: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Announce each node into `router` while it runs.
    #[must_use]
    pub fn with_router(mut self, router: RoutingDirectory) -> Self {
        self.router = Some(router);
        self
    }

    #[must_use]
    pub fn with_wrapper_spawner(mut self, spawner: Arc<dyn ExternalWrapperSpawner>) -> Self {
        self.wrappers = Some(spawner);
        self
    }

    #[must_use]
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    #[must_use]
    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    #[must_use]
    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.states.get(node_id).copied()
    }

    /// Ids of running nodes, in bring-up order.
    #[must_use]
    pub fn running_nodes(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter(|i| i.running)
            .map(|i| i.config.id.clone())
            .collect()
    }

    /// Store a validated topology. Nothing is instantiated.
    pub fn load(&mut self, topology: Topology) -> Result<(), ExecutorError> {
        if !self.instances.is_empty() {
            return Err(ExecutorError::InvalidArgument(
                "cannot load a topology while nodes are running".into(),
            ));
        }
        validate_topology(&topology)?;
        self.states = topology
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeState::Configured))
            .collect();
        info!(
            nodes = topology.nodes.len(),
            connections = topology.connections.len(),
            "topology.loaded"
        );
        self.topology = Some(topology);
        Ok(())
    }

    /// Instantiate, connect and start the loaded topology.
    pub async fn up(&mut self) -> Result<(), ExecutorError> {
        let Some(topology) = self.topology.clone() else {
            return Err(ExecutorError::InvalidArgument(
                "no topology loaded".into(),
            ));
        };
        if !self.instances.is_empty() {
            return Err(ExecutorError::InvalidArgument(
                "topology is already up".into(),
            ));
        }

        if let Err(e) = self.bring_up(&topology).await {
            error!(error = %e, "topology.up failed, rolling back");
            self.down().await;
            return Err(e);
        }
        info!(nodes = self.instances.len(), "topology.up");
        Ok(())
    }

    async fn bring_up(&mut self, topology: &Topology) -> Result<(), ExecutorError> {
        for node in &topology.nodes {
            self.instantiate(node).await?;
        }
        for connection in &topology.connections {
            self.graph.connect(&connection.from, &connection.to)?;
        }
        for index in 0..self.instances.len() {
            self.start_instance(index);
        }
        Ok(())
    }

    /// Stop every node and release its registrations and graph pipes.
    /// No-op when nothing runs.
    pub async fn down(&mut self) {
        let mut instances = std::mem::take(&mut self.instances);
        if !instances.is_empty() {
            info!(nodes = instances.len(), "topology.down");
        }
        while let Some(mut instance) = instances.pop() {
            self.teardown(&mut instance, true).await;
            self.states
                .insert(instance.config.id.clone(), NodeState::Stopped);
        }
        for state in self.states.values_mut() {
            if matches!(state, NodeState::Instantiating | NodeState::Restarting) {
                *state = NodeState::Stopped;
            }
        }
    }

    /// Rebuild one node from its stored config.
    pub async fn restart_node(&mut self, node_id: &str) -> Result<(), ExecutorError> {
        let index = self
            .instances
            .iter()
            .position(|i| i.config.id == node_id)
            .ok_or_else(|| ExecutorError::NotFound(node_id.to_string()))?;

        info!(node_id = %node_id, "node.restart");
        self.states
            .insert(node_id.to_string(), NodeState::Restarting);
        let mut old = self.instances.remove(index);
        self.teardown(&mut old, false).await;
        EXECUTOR_NODE_RESTARTS.inc();

        let config = old.config.clone();
        let handle = match self.create_handle(&config).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(node_id = %node_id, error = %e, "node.restart failed");
                self.teardown(&mut old, true).await;
                self.states.insert(node_id.to_string(), NodeState::Stopped);
                return Err(e);
            }
        };

        let mut fresh = NodeInstance::new(config, handle);
        fresh.graph_pipes = std::mem::take(&mut old.graph_pipes);
        self.instances.insert(index, fresh);
        if let Err(e) = self.register_instance(index) {
            error!(node_id = %node_id, error = %e, "node.restart failed");
            let mut failed = self.instances.remove(index);
            self.teardown(&mut failed, true).await;
            self.states.insert(node_id.to_string(), NodeState::Stopped);
            return Err(e);
        }
        self.start_instance(index);
        Ok(())
    }

    /// Launch an external server and add it to the node graph under its
    /// uuid, assigning one when the manifest has none.
    pub async fn spawn_external_wrapper(
        &self,
        mut manifest: ExternalServerManifest,
    ) -> Result<ExternalWrapper, ExecutorError> {
        let spawner = self.wrappers.as_ref().ok_or_else(|| {
            ExecutorError::InvalidArgument("no external wrapper spawner configured".into())
        })?;
        if manifest.servername.is_empty() || manifest.command.is_empty() {
            return Err(ExecutorError::InvalidArgument(
                "manifest needs a servername and a command".into(),
            ));
        }
        let id = manifest
            .uuid
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let wrapper = spawner.spawn(&manifest).await?;
        let descriptor = NodeDescriptor {
            id: id.clone(),
            name: manifest.servername.clone(),
            terminals: vec![
                Terminal::input("input"),
                Terminal::output("output"),
                Terminal::output("error"),
            ],
            capabilities: manifest.capabilities.features.clone().unwrap_or_default(),
            location: "local".into(),
        };
        if let Err(e) = self.graph.add_node(descriptor) {
            wrapper.shutdown(self.config.shutdown_timeout()).await;
            return Err(e.into());
        }
        info!(id = %id, servername = %manifest.servername, pid = ?wrapper.pid(), "wrapper.spawned");
        Ok(wrapper)
    }

    // =========================================================================
    // NODE LIFECYCLE
    // =========================================================================

    async fn instantiate(&mut self, node: &NodeConfig) -> Result<(), ExecutorError> {
        self.states
            .insert(node.id.clone(), NodeState::Instantiating);
        let handle = self.create_handle(node).await?;
        self.instances.push(NodeInstance::new(node.clone(), handle));
        self.register_instance(self.instances.len() - 1)
    }

    async fn create_handle(&self, node: &NodeConfig) -> Result<ModuleHandle, ExecutorError> {
        debug!(node_id = %node.id, module = %node.module, run_mode = %node.run_mode, "node.instantiate");
        match node.run_mode {
            RunMode::Inproc => {
                let factory = self.modules.get(&node.module).ok_or_else(|| {
                    ExecutorError::InvalidArgument(format!("unknown module: {}", node.module))
                })?;
                Ok(ModuleHandle::InProc(factory(&self.kernel, &node.params)?))
            }
            RunMode::Worker => {
                if self.modules.get(&node.module).is_none() {
                    return Err(ExecutorError::InvalidArgument(format!(
                        "unknown module: {}",
                        node.module
                    )));
                }
                let worker = WorkerNode::spawn(
                    &node.id,
                    &node.module,
                    node.params.clone(),
                    Arc::clone(&self.modules),
                    &self.kernel,
                    self.config.handshake_timeout(),
                )
                .await?;
                Ok(ModuleHandle::Worker(worker))
            }
            RunMode::Process => {
                let spec = ProcessSpec::from_params(&node.module, &node.params)?;
                let process = ProcessNode::spawn(&node.id, &spec, &self.kernel, StderrMode::Log)?;
                Ok(ModuleHandle::Process(process))
            }
        }
    }

    /// Register, track and wire the instance at `index`. Partial progress is
    /// recorded on the instance so teardown can undo it.
    fn register_instance(&mut self, index: usize) -> Result<(), ExecutorError> {
        let Self {
            kernel,
            identity,
            graph,
            router,
            instances,
            ..
        } = self;
        let instance = &mut instances[index];
        let node = instance.config.clone();

        let mut terminals = Vec::with_capacity(2);
        if instance.handle.input_pipe().is_some() {
            terminals.push(Terminal::input("input"));
        }
        if instance.handle.output_pipe().is_some() {
            terminals.push(Terminal::output("output"));
        }
        let class = ModuleClass::from_module_name(&node.module);
        let assigned = identity.register(ServerManifest {
            fqdn: "localhost".into(),
            servername: node.id.clone(),
            class_hex: class.class_hex().into(),
            owner: "system".into(),
            terminals: terminals.clone(),
            capabilities: Capabilities::new(class.capability_type()),
            uuid: None,
        })?;
        instance.identity = Some(assigned.clone());

        let metadata = node_metadata(&node);
        identity.register_endpoint(
            &assigned,
            EndpointRecord {
                kind: node.run_mode.as_str().into(),
                coordinates: coordinates(&node.id),
                metadata: Some(metadata.clone()),
            },
        )?;

        graph.add_node(NodeDescriptor {
            id: node.id.clone(),
            name: node.module.clone(),
            terminals,
            capabilities: vec![class.capability_type().into()],
            location: "local".into(),
        })?;
        instance.in_graph = true;

        if let Some(input) = instance.handle.input_pipe() {
            let address = format!("{}.input", node.id);
            let outer = graph.create_pipe(&address, PipeOptions::default())?;
            remember(&mut instance.graph_pipes, address);
            instance.wiring.push(kernel.connect(&outer, &input)?);
        }
        if let Some(output) = instance.handle.output_pipe() {
            let address = format!("{}.output", node.id);
            let outer = graph.create_pipe(&address, PipeOptions::default())?;
            remember(&mut instance.graph_pipes, address);
            instance.wiring.push(kernel.connect(&output, &outer)?);
        }

        if let Some(router) = router {
            let announcement =
                RoutingAnnouncement::new(&node.id, node.run_mode.as_str(), coordinates(&node.id))
                    .with_metadata(metadata);
            router
                .announce(announcement)
                .map_err(|e| ExecutorError::InvalidArgument(e.to_string()))?;
            instance.announced = true;
        }
        debug!(node_id = %node.id, identity = %assigned, "node.registered");
        Ok(())
    }

    fn start_instance(&mut self, index: usize) {
        let instance = &mut self.instances[index];
        instance.handle.start();
        if !instance.running {
            instance.running = true;
            EXECUTOR_NODES_RUNNING
                .with_label_values(&[instance.config.run_mode.as_str()])
                .inc();
        }
        self.states
            .insert(instance.config.id.clone(), NodeState::Running);
        info!(node_id = %instance.config.id, run_mode = %instance.config.run_mode, "node.running");
    }

    /// Undo whatever `instance` has acquired. Safe to call more than once.
    async fn teardown(&self, instance: &mut NodeInstance, remove_pipes: bool) {
        let node_id = instance.config.id.clone();
        for edge in instance.wiring.drain(..) {
            edge.detach().await;
        }
        instance.handle.stop(self.config.shutdown_timeout()).await;
        if instance.running {
            instance.running = false;
            EXECUTOR_NODES_RUNNING
                .with_label_values(&[instance.config.run_mode.as_str()])
                .dec();
        }
        if let Some(identity) = instance.identity.take() {
            if !self.identity.unregister(&identity) {
                warn!(node_id = %node_id, identity = %identity, "identity already gone");
            }
        }
        if instance.in_graph {
            self.graph.remove_node(&node_id);
            instance.in_graph = false;
        }
        if instance.announced {
            if let Some(router) = &self.router {
                router.withdraw(&node_id);
            }
            instance.announced = false;
        }
        if remove_pipes {
            for address in instance.graph_pipes.drain(..) {
                self.graph.remove_pipe(&address).await;
            }
        }
        debug!(node_id = %node_id, "node.stopped");
    }
}

fn remember(addresses: &mut Vec<String>, address: String) {
    if !addresses.contains(&address) {
        addresses.push(address);
    }
}
