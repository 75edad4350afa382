//! # Control Plane
//!
//! Drives the worker harness directly over paired channels, playing the
//! executor's side of the handshake by hand.

use anyhow::{bail, Context, Result};
use mk_01_pipe_kernel::Chunk;
use mk_04_topology_executor::{run_worker, ModuleRegistry, WorkerSpawn};
use shared_bus::{
    channel_pair, ChannelEnd, ControlBus, ControlMessage, CONTROL_COMMAND_TOPIC,
    CONTROL_HELLO_TOPIC,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct ExecutorSide {
    bus: ControlBus,
    input: ChannelEnd<Chunk>,
    output: ChannelEnd<Chunk>,
    worker: JoinHandle<()>,
}

fn launch(node_id: &str, module: &str) -> (ExecutorSide, shared_bus::ControlSubscription) {
    let (control_local, control_remote) = channel_pair(16);
    let (input_local, input_remote) = channel_pair(16);
    let (output_local, output_remote) = channel_pair(16);

    let bus = ControlBus::over_channel(control_local);
    let hello = bus.subscribe(CONTROL_HELLO_TOPIC);
    let worker = tokio::spawn(run_worker(WorkerSpawn {
        node_id: node_id.to_string(),
        module_path: module.to_string(),
        params: serde_json::json!({}),
        modules: Arc::new(ModuleRegistry::new()),
        control: control_remote,
        input: input_remote,
        output: output_remote,
    }));
    (
        ExecutorSide {
            bus,
            input: input_local,
            output: output_local,
            worker,
        },
        hello,
    )
}

#[tokio::test]
async fn test_handshake_data_and_shutdown() -> Result<()> {
    let (mut side, mut hello) = launch("w1", "UppercaseTransform");

    match timeout(WAIT, hello.recv()).await? {
        Some(ControlMessage::WorkerReady { node_id }) => assert_eq!(node_id, "w1"),
        other => bail!("expected worker.ready, got {other:?}"),
    }

    side.input.send(Chunk::from("quiet")).await?;
    let echoed = timeout(WAIT, side.output.recv())
        .await?
        .context("output channel closed")?;
    assert_eq!(echoed, Chunk::from("QUIET"));

    side.bus
        .publish(CONTROL_COMMAND_TOPIC, ControlMessage::Shutdown)
        .await?;
    timeout(WAIT, side.worker).await??;
    Ok(())
}

#[tokio::test]
async fn test_unknown_module_reports_worker_error() -> Result<()> {
    let (side, mut hello) = launch("w2", "Missing");

    match timeout(WAIT, hello.recv()).await? {
        Some(ControlMessage::WorkerError { node_id, message }) => {
            assert_eq!(node_id, "w2");
            assert!(message.contains("Missing"), "got {message}");
        }
        other => bail!("expected worker.error, got {other:?}"),
    }
    // The harness exits right after reporting.
    timeout(WAIT, side.worker).await??;
    Ok(())
}

#[tokio::test]
async fn test_worker_exits_when_executor_side_disappears() -> Result<()> {
    let (side, mut hello) = launch("w3", "TimerSource");
    assert!(matches!(
        timeout(WAIT, hello.recv()).await?,
        Some(ControlMessage::WorkerReady { .. })
    ));

    let ExecutorSide { bus, worker, .. } = side;
    drop(hello);
    drop(bus);
    timeout(WAIT, worker).await??;
    Ok(())
}

#[tokio::test]
async fn test_worker_module_runs_before_any_command() -> Result<()> {
    let (mut side, mut hello) = launch("w4", "TimerSource");
    assert!(matches!(
        timeout(WAIT, hello.recv()).await?,
        Some(ControlMessage::WorkerReady { .. })
    ));

    // Started by the harness itself: ticks arrive with no command sent.
    let tick = timeout(WAIT, side.output.recv())
        .await?
        .context("output channel closed")?;
    assert!(matches!(tick, Chunk::Json(ref v) if v.get("n").is_some()), "got {tick:?}");

    side.bus
        .publish(CONTROL_COMMAND_TOPIC, ControlMessage::Shutdown)
        .await?;
    timeout(WAIT, side.worker).await??;
    Ok(())
}
