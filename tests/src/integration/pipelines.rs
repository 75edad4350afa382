//! # Pipeline Flows
//!
//! Topology documents driven end to end through the executor, plus raw
//! kernel fan-out and fan-in.

use anyhow::{Context, Result};
use mk_01_pipe_kernel::{Chunk, Kernel, Pipe, PipeOptions};
use mk_02_routing_directory::{RouterConfig, RoutingDirectory};
use mk_04_topology_executor::{
    load_topology_file, parse_topology, InMemoryIdentityRegistry, InMemoryNodeGraph,
    ModuleRegistry, NodeState, RuntimeConfig, TopologyExecutor,
};
use mk_telemetry::EXECUTOR_NODE_RESTARTS;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const TIMER_UPPER_SINK: &str = r#"
nodes:
  - id: timer
    module: TimerSource
    params:
      periodMs: 10
  - id: upper
    module: UppercaseTransform
    runMode: worker
  - id: sink
    module: ConsoleSink
    params:
      prefix: "[it]"
connections:
  - from: timer.output
    to: upper.input
"#;

// =============================================================================
// TEST FIXTURES
// =============================================================================

struct Stack {
    executor: TopologyExecutor,
    identity: Arc<InMemoryIdentityRegistry>,
    graph: Arc<InMemoryNodeGraph>,
}

fn stack() -> Stack {
    let kernel = Kernel::new();
    let identity = Arc::new(InMemoryIdentityRegistry::new());
    let graph = Arc::new(InMemoryNodeGraph::new(kernel.clone()));
    let executor = TopologyExecutor::new(
        kernel,
        identity.clone(),
        graph.clone(),
        Arc::new(ModuleRegistry::new()),
    );
    Stack {
        executor,
        identity,
        graph,
    }
}

async fn next_text(pipe: &Pipe) -> Result<String> {
    let chunk = tokio::time::timeout(Duration::from_secs(5), pipe.read())
        .await
        .context("timed out waiting for a chunk")?
        .context("pipe ended")?;
    Ok(chunk.to_text().into_owned())
}

// =============================================================================
// EXECUTOR FLOWS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_topology_file_runs_across_isolation_modes() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".yml").tempfile()?;
    file.write_all(TIMER_UPPER_SINK.as_bytes())?;
    let topology = load_topology_file(file.path())?;

    let router = RoutingDirectory::new(RouterConfig::default());
    let mut s = stack();
    s.executor = s.executor.with_router(router.clone());
    s.executor.load(topology)?;
    s.executor.up().await?;

    assert_eq!(s.executor.running_nodes(), vec!["timer", "upper", "sink"]);
    let upper = router.resolve("node:upper").context("upper not announced")?;
    assert_eq!(upper.kind, "worker");

    let out = s.graph.pipe("upper.output").context("no upper.output")?;
    for _ in 0..3 {
        let text = next_text(&out).await?;
        assert!(text.starts_with('{') && text.contains("\"N\":"), "got {text}");
    }

    s.executor.down().await;
    assert!(router.is_empty());
    assert!(s.identity.is_empty());
    assert_eq!(s.executor.node_state("upper"), Some(NodeState::Stopped));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_worker_under_load() -> Result<()> {
    let topology = parse_topology(
        r#"{"nodes": [
              {"id": "timer", "module": "TimerSource", "params": {"periodMs": 5}},
              {"id": "upper", "module": "UppercaseTransform", "runMode": "worker"}
            ],
            "connections": [{"from": "timer.output", "to": "upper.input"}]}"#,
    )?;
    let mut s = stack();
    s.executor.load(topology)?;
    s.executor.up().await?;
    let out = s.graph.pipe("upper.output").context("no upper.output")?;
    next_text(&out).await?;

    let restarts_before = EXECUTOR_NODE_RESTARTS.get();
    for _ in 0..2 {
        s.executor.restart_node("upper").await?;
        assert_eq!(s.executor.node_state("upper"), Some(NodeState::Running));
        assert_eq!(s.identity.find_by_servername("upper").len(), 1);
        next_text(&out).await?;
    }
    assert!(EXECUTOR_NODE_RESTARTS.get() >= restarts_before + 2);

    s.executor.down().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_runtime_config_bounds_worker_handshake() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "[executor]\nhandshake_timeout_ms = 50")?;
    let config = RuntimeConfig::load(file.path())?;

    let modules = ModuleRegistry::new();
    modules.register("Sluggish", |_, _| {
        std::thread::sleep(Duration::from_millis(300));
        Err(mk_04_topology_executor::ModuleError::Construction {
            module: "Sluggish".into(),
            reason: "never ready".into(),
        })
    });
    let kernel = Kernel::new();
    let graph = Arc::new(InMemoryNodeGraph::new(kernel.clone()));
    let mut executor = TopologyExecutor::new(
        kernel,
        Arc::new(InMemoryIdentityRegistry::new()),
        graph.clone(),
        Arc::new(modules),
    )
    .with_config(config.executor);

    executor.load(parse_topology(
        "nodes:\n  - id: slow\n    module: Sluggish\n    runMode: worker\nconnections: []\n",
    )?)?;
    let err = executor.up().await.expect_err("handshake should time out");
    assert!(err.to_string().contains("within 50 ms"), "got {err}");
    assert!(graph.nodes().is_empty());
    Ok(())
}

// =============================================================================
// KERNEL FLOWS
// =============================================================================

#[tokio::test]
async fn test_split_then_merge_delivers_every_chunk_twice() -> Result<()> {
    let kernel = Kernel::new();
    let source = kernel.create_pipe(PipeOptions::labeled("source"))?;
    let left = kernel.create_pipe(PipeOptions::labeled("left"))?;
    let right = kernel.create_pipe(PipeOptions::labeled("right"))?;
    let sink = kernel.create_pipe(PipeOptions::labeled("sink").with_high_water_mark(64))?;

    let _split = kernel.split(&source, &[left.clone(), right.clone()])?;
    let merge = kernel.merge(&[left, right], &sink)?;

    for i in 0..10 {
        source.write(Chunk::Json(serde_json::json!({ "i": i }))).await?;
    }
    source.end();

    let collected = tokio::time::timeout(Duration::from_secs(5), sink.collect()).await?;
    assert_eq!(collected.len(), 20);
    for i in 0..10 {
        let copies = collected
            .iter()
            .filter(|c| **c == Chunk::Json(serde_json::json!({ "i": i })))
            .count();
        assert_eq!(copies, 2, "chunk {i}");
    }
    merge.finished().await;
    assert!(sink.is_ended());
    Ok(())
}
