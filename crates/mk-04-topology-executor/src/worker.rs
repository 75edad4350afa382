//! # Worker Isolation
//!
//! A worker node runs on its own OS thread with a private single-threaded
//! runtime. It shares nothing with the executor except three paired
//! channels:
//!
//! ```text
//!   executor                                   worker thread
//!  ┌───────────────┐      control (bus)       ┌──────────────────┐
//!  │ ControlBus    │ <══════════════════════> │ ControlBus       │
//!  │ input pipe  ──┼──────── input ─────────> │──> module.input  │
//!  │ output pipe <─┼──────── output ───────── │<── module.output │
//!  └───────────────┘                          └──────────────────┘
//! ```
//!
//! ## Handshake
//!
//! 1. The executor subscribes to `control.hello`, then starts the thread.
//! 2. The harness builds the module, bridges the channels, starts it, and
//!    publishes exactly one `worker.ready` (or one `worker.error`).
//! 3. The executor waits for it, bounded by the handshake timeout.
//! 4. `shutdown` on `control.cmd` stops the module and ends the thread.
//!
//! The module is started in step 2, so it is running before the executor
//! applies connections. Anything it writes before then waits in the output
//! channel and stalls the module once that channel is full.

use crate::domain::ExecutorError;
use crate::ports::ModuleLookup;
use mk_01_pipe_kernel::{Chunk, Kernel, Pipe, PipeOptions, DEFAULT_HIGH_WATER_MARK};
use mk_telemetry::EXECUTOR_WORKER_HANDSHAKES;
use parking_lot::Mutex;
use shared_bus::{
    channel_pair, ChannelEnd, ControlBus, ControlEnvelope, ControlMessage, ControlSubscription,
    CONTROL_COMMAND_TOPIC, CONTROL_HELLO_TOPIC,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Control messages buffered in each direction.
const CONTROL_CHANNEL_CAPACITY: usize = 32;

/// Startup payload handed to the worker thread.
pub struct WorkerSpawn {
    pub node_id: String,
    /// Module name, resolved through `modules` inside the worker.
    pub module_path: String,
    pub params: serde_json::Value,
    pub modules: Arc<dyn ModuleLookup>,
    pub control: ChannelEnd<ControlEnvelope>,
    pub input: ChannelEnd<Chunk>,
    pub output: ChannelEnd<Chunk>,
}

/// Worker-side harness. Returns when told to shut down, when the executor
/// side disappears, or right after reporting a construction failure.
pub async fn run_worker(spawn: WorkerSpawn) {
    let WorkerSpawn {
        node_id,
        module_path,
        params,
        modules,
        control,
        input,
        output,
    } = spawn;

    let bus = ControlBus::over_channel(control);
    let mut commands = bus.subscribe(CONTROL_COMMAND_TOPIC);

    let kernel = Kernel::new();
    let built = match modules.get(&module_path) {
        Some(factory) => factory(&kernel, &params).map_err(|e| e.to_string()),
        None => Err(format!("unknown module: {module_path}")),
    };
    let module = match built {
        Ok(module) => module,
        Err(message) => {
            error!(node_id = %node_id, module = %module_path, error = %message, "worker.construct failed");
            let report = ControlMessage::WorkerError {
                node_id: node_id.clone(),
                message,
            };
            if bus.publish(CONTROL_HELLO_TOPIC, report).await.is_err() {
                debug!(node_id = %node_id, "executor gone before error report");
            }
            return;
        }
    };

    let mut bridges: Vec<JoinHandle<()>> = Vec::with_capacity(2);
    let (_, mut inbound) = input.split();
    if let Some(pipe) = module.input_pipe() {
        bridges.push(tokio::spawn(async move {
            while let Some(chunk) = inbound.recv().await {
                if pipe.write(chunk).await.is_err() {
                    return;
                }
            }
            pipe.end();
        }));
    }
    let (outbound, _) = output.split();
    if let Some(pipe) = module.output_pipe() {
        bridges.push(tokio::spawn(async move {
            while let Some(chunk) = pipe.read().await {
                if outbound.send(chunk).await.is_err() {
                    return;
                }
            }
        }));
    }

    module.start();
    let ready = ControlMessage::WorkerReady {
        node_id: node_id.clone(),
    };
    if bus.publish(CONTROL_HELLO_TOPIC, ready).await.is_err() {
        warn!(node_id = %node_id, "executor gone before ready");
        module.stop();
        return;
    }
    debug!(node_id = %node_id, "worker.ready sent");

    loop {
        match commands.recv().await {
            Some(ControlMessage::Shutdown) => {
                debug!(node_id = %node_id, "worker.shutdown");
                break;
            }
            Some(other) => debug!(node_id = %node_id, kind = other.kind(), "worker ignoring command"),
            None => {
                debug!(node_id = %node_id, "control channel closed");
                break;
            }
        }
    }

    module.stop();
    for bridge in bridges {
        bridge.abort();
    }
}

/// Start `spawn` on a dedicated thread with its own current-thread runtime.
fn spawn_worker_thread(spawn: WorkerSpawn) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("mk-worker-{}", spawn.node_id))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    // Dropping the payload closes the control channel.
                    error!(node_id = %spawn.node_id, error = %e, "worker runtime failed");
                    return;
                }
            };
            runtime.block_on(run_worker(spawn));
        })
}

enum Hello {
    Ready,
    Failed(String),
    Closed,
}

async fn await_hello(hello: &mut ControlSubscription, node_id: &str) -> Hello {
    loop {
        match hello.recv().await {
            Some(ControlMessage::WorkerReady { node_id: from }) if from == node_id => {
                return Hello::Ready
            }
            Some(ControlMessage::WorkerError { message, .. }) => return Hello::Failed(message),
            Some(other) => debug!(node_id = %node_id, kind = other.kind(), "unexpected hello"),
            None => return Hello::Closed,
        }
    }
}

/// Executor-side handle of a running worker.
pub struct WorkerNode {
    node_id: String,
    bus: ControlBus,
    input: Pipe,
    output: Pipe,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    tasks: Vec<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl WorkerNode {
    /// Spawn the worker and wait for its readiness handshake.
    ///
    /// Fails with [`ExecutorError::IsolationFault`] when the worker reports
    /// an error, its control channel closes, or `handshake_timeout` elapses.
    pub async fn spawn(
        node_id: &str,
        module_path: &str,
        params: serde_json::Value,
        modules: Arc<dyn ModuleLookup>,
        kernel: &Kernel,
        handshake_timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        let (control_local, control_remote) = channel_pair(CONTROL_CHANNEL_CAPACITY);
        let (input_local, input_remote) = channel_pair::<Chunk>(DEFAULT_HIGH_WATER_MARK);
        let (output_local, output_remote) = channel_pair::<Chunk>(DEFAULT_HIGH_WATER_MARK);

        let bus = ControlBus::over_channel(control_local);
        // Subscribe before the thread exists so the hello cannot be missed.
        let mut hello = bus.subscribe(CONTROL_HELLO_TOPIC);

        let thread = spawn_worker_thread(WorkerSpawn {
            node_id: node_id.to_string(),
            module_path: module_path.to_string(),
            params,
            modules,
            control: control_remote,
            input: input_remote,
            output: output_remote,
        })
        .map_err(|e| ExecutorError::isolation(node_id, format!("thread spawn failed: {e}")))?;

        let input = kernel.create_pipe(PipeOptions::labeled(format!("{node_id}.worker.in")))?;
        let output = kernel.create_pipe(PipeOptions::labeled(format!("{node_id}.worker.out")))?;
        let mut tasks = Vec::with_capacity(3);

        let (to_worker, _) = input_local.split();
        let from = input.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(chunk) = from.read().await {
                if to_worker.send(chunk).await.is_err() {
                    return;
                }
            }
        }));

        let (_, mut from_worker) = output_local.split();
        let to = output.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(chunk) = from_worker.recv().await {
                if to.write(chunk).await.is_err() {
                    return;
                }
            }
            to.end();
        }));

        let outcome = tokio::time::timeout(handshake_timeout, await_hello(&mut hello, node_id)).await;
        let failure = match outcome {
            Ok(Hello::Ready) => None,
            Ok(Hello::Failed(message)) => Some(("error", message)),
            Ok(Hello::Closed) => Some(("closed", "worker exited before ready".to_string())),
            Err(_) => Some((
                "timeout",
                format!(
                    "worker.ready not received within {} ms",
                    handshake_timeout.as_millis()
                ),
            )),
        };
        if let Some((outcome, reason)) = failure {
            EXECUTOR_WORKER_HANDSHAKES.with_label_values(&[outcome]).inc();
            error!(node_id = %node_id, outcome, reason = %reason, "worker.handshake failed");
            for task in &tasks {
                task.abort();
            }
            if bus.publish(CONTROL_COMMAND_TOPIC, ControlMessage::Shutdown).await.is_err() {
                debug!(node_id = %node_id, "worker already gone");
            }
            // The thread is left to wind down on its own.
            return Err(ExecutorError::isolation(node_id, reason));
        }
        EXECUTOR_WORKER_HANDSHAKES.with_label_values(&["ready"]).inc();
        info!(node_id = %node_id, module = %module_path, "worker.ready");

        let stopping = Arc::new(AtomicBool::new(false));
        let watch_stop = Arc::clone(&stopping);
        let watched = node_id.to_string();
        tasks.push(tokio::spawn(async move {
            loop {
                match hello.recv().await {
                    Some(ControlMessage::WorkerError { message, .. }) => {
                        error!(node_id = %watched, error = %message, "worker.error");
                    }
                    Some(_) => {}
                    None => {
                        if !watch_stop.load(Ordering::Acquire) {
                            error!(node_id = %watched, "worker exited unexpectedly");
                        }
                        return;
                    }
                }
            }
        }));

        Ok(Self {
            node_id: node_id.to_string(),
            bus,
            input,
            output,
            thread: Mutex::new(Some(thread)),
            tasks,
            stopping,
        })
    }

    #[must_use]
    pub fn input_pipe(&self) -> Pipe {
        self.input.clone()
    }

    #[must_use]
    pub fn output_pipe(&self) -> Pipe {
        self.output.clone()
    }

    /// Send `shutdown` and wait up to `grace` for the thread to exit.
    ///
    /// Returns whether the thread exited in time. Idempotent.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.stopping.store(true, Ordering::Release);
        let Some(thread) = self.thread.lock().take() else {
            return true;
        };
        if self
            .bus
            .publish(CONTROL_COMMAND_TOPIC, ControlMessage::Shutdown)
            .await
            .is_err()
        {
            debug!(node_id = %self.node_id, "control channel already closed");
        }

        let joined = tokio::time::timeout(grace, tokio::task::spawn_blocking(move || thread.join())).await;
        let exited = match joined {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(_))) => {
                error!(node_id = %self.node_id, "worker thread panicked");
                true
            }
            Ok(Err(e)) => {
                warn!(node_id = %self.node_id, error = %e, "worker join failed");
                false
            }
            Err(_) => {
                warn!(node_id = %self.node_id, grace_ms = grace.as_millis() as u64, "worker did not exit in time");
                false
            }
        };
        for task in &self.tasks {
            task.abort();
        }
        self.input.end();
        self.output.end();
        debug!(node_id = %self.node_id, exited, "worker.stopped");
        exited
    }
}

impl Drop for WorkerNode {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
