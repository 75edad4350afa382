//! # Child Processes
//!
//! Runs a command as a child process and bridges its stdio to pipes:
//!
//! ```text
//!  input pipe ──> stdin ┌─────────┐ stdout ──> output pipe
//!                       │  child  │
//!                       └─────────┘ stderr ──> error pipe, or the log
//! ```
//!
//! Stdout and stderr are forwarded as [`Chunk::Bytes`] in whatever sizes the
//! OS delivers them.
//!
//! A watcher task owns the child and reaps it as soon as it exits. An exit
//! before [`ProcessNode::shutdown`] is an isolation fault and is logged at
//! error level, unless the child succeeded after its stdin was ended.

use crate::domain::{ExecutorError, ExternalServerManifest, ModuleError};
use crate::modules::parse_params;
use mk_01_pipe_kernel::{Chunk, Kernel, Pipe, PipeOptions};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const READ_BUFFER_BYTES: usize = 8 * 1024;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
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

    /// Read `{command, args?, env?, cwd?}` from a node's params.
    pub fn from_params(module: &str, params: &serde_json::Value) -> Result<Self, ModuleError> {
        let spec: ProcessSpec = parse_params(module, params)?;
        if spec.command.is_empty() {
            return Err(ModuleError::InvalidParams {
                module: module.to_string(),
                reason: "command must not be empty".into(),
            });
        }
        Ok(spec)
    }
}

impl From<&ExternalServerManifest> for ProcessSpec {
    fn from(manifest: &ExternalServerManifest) -> Self {
        Self {
            command: manifest.command.clone(),
            args: manifest.args.clone(),
            env: manifest.env.clone(),
            cwd: manifest.cwd.clone(),
        }
    }
}

/// Where the child's stderr goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrMode {
    /// Each line is logged at warn level.
    Log,
    /// Forwarded to [`ProcessNode::error_pipe`].
    Pipe,
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited successfully after its input ended.
    Completed(ExitStatus),
    /// Exited before shutdown was requested.
    Unexpected(ExitStatus),
    /// Ended after shutdown was requested. `None` when it had to be killed
    /// or its status could not be read.
    Requested(Option<ExitStatus>),
}

impl ProcessExit {
    #[must_use]
    pub fn status(&self) -> Option<ExitStatus> {
        match self {
            ProcessExit::Completed(status) | ProcessExit::Unexpected(status) => Some(*status),
            ProcessExit::Requested(status) => *status,
        }
    }
}

/// A running child process and its stdio bridges.
pub struct ProcessNode {
    label: String,
    pid: Option<u32>,
    input: Pipe,
    output: Pipe,
    error: Pipe,
    /// Taken by the first `shutdown`; carries the grace period to the watcher.
    stop: Mutex<Option<oneshot::Sender<Duration>>>,
    exit: watch::Receiver<Option<ProcessExit>>,
    watcher: JoinHandle<()>,
    bridges: Vec<JoinHandle<()>>,
}

impl ProcessNode {
    /// Spawn `spec` and start bridging. Must be called inside a tokio runtime.
    pub fn spawn(
        label: &str,
        spec: &ProcessSpec,
        kernel: &Kernel,
        stderr_mode: StderrMode,
    ) -> Result<Self, ExecutorError> {
        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            ExecutorError::isolation(label, format!("failed to spawn {}: {e}", spec.command))
        })?;
        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(mut stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
            return Err(ExecutorError::isolation(label, "child stdio unavailable"));
        };

        let input = kernel.create_pipe(PipeOptions::labeled(format!("{label}.stdin")))?;
        let output = kernel.create_pipe(PipeOptions::labeled(format!("{label}.stdout")))?;
        let error = kernel.create_pipe(PipeOptions::labeled(format!("{label}.stderr")))?;

        let mut bridges = Vec::with_capacity(3);

        let from = input.clone();
        let name = label.to_string();
        bridges.push(tokio::spawn(async move {
            while let Some(chunk) = from.read().await {
                if let Err(e) = stdin.write_all(&chunk.into_bytes()).await {
                    debug!(node_id = %name, error = %e, "stdin closed");
                    return;
                }
            }
            if let Err(e) = stdin.shutdown().await {
                warn!(node_id = %name, error = %e, "stdin shutdown failed");
            }
        }));

        bridges.push(tokio::spawn(forward_bytes(stdout, output.clone())));

        match stderr_mode {
            StderrMode::Pipe => bridges.push(tokio::spawn(forward_bytes(stderr, error.clone()))),
            StderrMode::Log => {
                error.end();
                let name = label.to_string();
                bridges.push(tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        warn!(node_id = %name, "stderr: {line}");
                    }
                }));
            }
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        let watcher = tokio::spawn(watch_exit(
            label.to_string(),
            child,
            input.clone(),
            stop_rx,
            exit_tx,
        ));

        info!(node_id = %label, command = %spec.command, pid = ?pid, "process.spawned");
        Ok(Self {
            label: label.to_string(),
            pid,
            input,
            output,
            error,
            stop: Mutex::new(Some(stop_tx)),
            exit: exit_rx,
            watcher,
            bridges,
        })
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[must_use]
    pub fn input_pipe(&self) -> Pipe {
        self.input.clone()
    }

    #[must_use]
    pub fn output_pipe(&self) -> Pipe {
        self.output.clone()
    }

    #[must_use]
    pub fn error_pipe(&self) -> Pipe {
        self.error.clone()
    }

    /// How the child ended, or `None` while it runs.
    #[must_use]
    pub fn exit(&self) -> Option<ProcessExit> {
        *self.exit.borrow()
    }

    /// Wait until the child has ended, however that happens.
    pub async fn exited(&self) -> Option<ProcessExit> {
        let mut exit = self.exit.clone();
        let ended = exit.wait_for(Option::is_some).await.ok()?;
        *ended
    }

    /// End stdin and wait up to `grace` for the child to exit, then kill it.
    ///
    /// Returns the exit status when the child exited by itself, including an
    /// earlier unexpected exit. Idempotent: later calls return `None`.
    pub async fn shutdown(&self, grace: Duration) -> Option<ExitStatus> {
        self.input.end();
        let stop = self.stop.lock().take()?;
        // The watcher is gone already when the child exited unexpectedly.
        let _ = stop.send(grace);
        let status = self.exited().await.and_then(|exit| exit.status());
        for bridge in &self.bridges {
            bridge.abort();
        }
        self.output.end();
        self.error.end();
        status
    }
}

impl Drop for ProcessNode {
    fn drop(&mut self) {
        // The child is killed when the watcher drops it.
        self.watcher.abort();
        for bridge in &self.bridges {
            bridge.abort();
        }
    }
}

/// Own `child` until it exits or shutdown asks it to.
async fn watch_exit(
    label: String,
    mut child: Child,
    input: Pipe,
    stop: oneshot::Receiver<Duration>,
    exit: watch::Sender<Option<ProcessExit>>,
) {
    let ended = tokio::select! {
        waited = child.wait() => match waited {
            Ok(status) if status.success() && input.is_ended() => {
                info!(node_id = %label, %status, "process.exited");
                ProcessExit::Completed(status)
            }
            Ok(status) => {
                error!(node_id = %label, %status, "isolation.fault: process exited unexpectedly");
                ProcessExit::Unexpected(status)
            }
            Err(e) => {
                error!(node_id = %label, error = %e, "isolation.fault: process wait failed");
                ProcessExit::Requested(None)
            }
        },
        grace = stop => {
            // A dropped sender means the node is gone; do not linger.
            let grace = grace.unwrap_or(Duration::ZERO);
            ProcessExit::Requested(wait_or_kill(&label, &mut child, grace).await)
        }
    };
    exit.send_replace(Some(ended));
}

async fn wait_or_kill(label: &str, child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            info!(node_id = %label, %status, "process.exited");
            Some(status)
        }
        Ok(Err(e)) => {
            warn!(node_id = %label, error = %e, "process.wait failed");
            None
        }
        Err(_) => {
            warn!(node_id = %label, grace_ms = grace.as_millis() as u64, "process.kill");
            if let Err(e) = child.kill().await {
                warn!(node_id = %label, error = %e, "process.kill failed");
            }
            None
        }
    }
}

async fn forward_bytes<R>(mut reader: R, to: Pipe)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_BYTES];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if to.write(Chunk::Bytes(buf[..n].to_vec())).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(pipe = %to.label(), error = %e, "read failed");
                break;
            }
        }
    }
    to.end();
}

/// An external server launched by a spawner.
pub struct ExternalWrapper {
    id: String,
    manifest: ExternalServerManifest,
    process: ProcessNode,
}

impl ExternalWrapper {
    pub fn new(id: impl Into<String>, manifest: ExternalServerManifest, process: ProcessNode) -> Self {
        Self {
            id: id.into(),
            manifest,
            process,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn manifest(&self) -> &ExternalServerManifest {
        &self.manifest
    }

    #[must_use]
    pub fn input_pipe(&self) -> Pipe {
        self.process.input_pipe()
    }

    #[must_use]
    pub fn output_pipe(&self) -> Pipe {
        self.process.output_pipe()
    }

    #[must_use]
    pub fn error_pipe(&self) -> Pipe {
        self.process.error_pipe()
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub async fn shutdown(&self, grace: Duration) -> Option<ExitStatus> {
        self.process.shutdown(grace).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_cat_round_trips_stdin_to_stdout() {
        let kernel = Kernel::new();
        let node =
            ProcessNode::spawn("cat", &ProcessSpec::new("cat"), &kernel, StderrMode::Log).unwrap();
        assert!(node.pid().is_some());

        node.input_pipe().write("hello\n").await.unwrap();
        node.input_pipe().end();

        let out: Vec<u8> = node
            .output_pipe()
            .collect()
            .await
            .into_iter()
            .flat_map(Chunk::into_bytes)
            .collect();
        assert_eq!(out, b"hello\n");

        let status = node.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(status.success());
        assert!(node.shutdown(Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_stderr_to_pipe() {
        let kernel = Kernel::new();
        let spec = ProcessSpec::new("sh").with_args(["-c", "echo oops >&2"]);
        let node = ProcessNode::spawn("sh", &spec, &kernel, StderrMode::Pipe).unwrap();
        let err: Vec<u8> = node
            .error_pipe()
            .collect()
            .await
            .into_iter()
            .flat_map(Chunk::into_bytes)
            .collect();
        assert_eq!(err, b"oops\n");
        node.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_unresponsive_child_is_killed() {
        let kernel = Kernel::new();
        let spec = ProcessSpec::new("sleep").with_args(["30"]);
        let node = ProcessNode::spawn("sleeper", &spec, &kernel, StderrMode::Log).unwrap();
        assert!(node.shutdown(Duration::from_millis(50)).await.is_none());
        assert_eq!(node.exit(), Some(ProcessExit::Requested(None)));
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_reaped_as_fault() {
        let kernel = Kernel::new();
        let spec = ProcessSpec::new("sh").with_args(["-c", "exit 3"]);
        let node = ProcessNode::spawn("crasher", &spec, &kernel, StderrMode::Log).unwrap();

        // Observed without anyone calling shutdown.
        let exit = tokio::time::timeout(Duration::from_secs(5), node.exited())
            .await
            .unwrap()
            .unwrap();
        match exit {
            ProcessExit::Unexpected(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected an unexpected exit, got {other:?}"),
        }

        let status = node.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert!(node.shutdown(Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_filter_finishing_on_eof_is_not_a_fault() {
        let kernel = Kernel::new();
        let node =
            ProcessNode::spawn("cat", &ProcessSpec::new("cat"), &kernel, StderrMode::Log).unwrap();
        node.input_pipe().write("bye\n").await.unwrap();
        node.input_pipe().end();

        let exit = tokio::time::timeout(Duration::from_secs(5), node.exited())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(exit, ProcessExit::Completed(status) if status.success()));
        assert!(node.shutdown(Duration::from_secs(1)).await.unwrap().success());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_isolation_fault() {
        let kernel = Kernel::new();
        let spec = ProcessSpec::new("/definitely/not/a/binary");
        let result = ProcessNode::spawn("ghost", &spec, &kernel, StderrMode::Log);
        assert!(matches!(
            result,
            Err(ExecutorError::IsolationFault { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn test_process_spec_from_params() {
        let spec = ProcessSpec::from_params("Process", &json!({"command": "cat", "args": ["-u"]}))
            .unwrap();
        assert_eq!(spec.args, vec!["-u"]);
        assert!(ProcessSpec::from_params("Process", &json!({"command": ""})).is_err());
        assert!(ProcessSpec::from_params("Process", &json!({})).is_err());
    }
}
