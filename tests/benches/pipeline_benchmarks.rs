//! # mkolbol Pipeline Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | Pipe kernel | chunk throughput over a connect chain |
//! | Pipe kernel | split fan-out |
//! | Routing directory | announce and resolve |
//! | Routing directory | sweep of a half-expired table |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mk_01_pipe_kernel::{Chunk, Kernel, PipeOptions};
use mk_02_routing_directory::{
    ManualTimeSource, RouterConfig, RoutingAnnouncement, RoutingDirectory,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime")
}

// ============================================================================
// PIPE KERNEL
// ============================================================================

fn bench_connect_chain(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("kernel-connect-chain");
    group.measurement_time(Duration::from_secs(5));

    for hops in [1usize, 4, 16] {
        let chunks = 1_000u64;
        group.throughput(Throughput::Elements(chunks));
        group.bench_with_input(BenchmarkId::from_parameter(hops), &hops, |b, &hops| {
            b.iter(|| {
                rt.block_on(async {
                    let kernel = Kernel::new();
                    let head = kernel.create_pipe(PipeOptions::default()).expect("pipe");
                    let mut tail = head.clone();
                    let mut edges = Vec::with_capacity(hops);
                    for _ in 0..hops {
                        let next = kernel.create_pipe(PipeOptions::default()).expect("pipe");
                        edges.push(kernel.connect(&tail, &next).expect("connect"));
                        tail = next;
                    }
                    let writer = tokio::spawn(async move {
                        for i in 0..chunks {
                            head.write(Chunk::Text(i.to_string())).await.expect("write");
                        }
                        head.end();
                    });
                    let received = tail.collect().await.len();
                    writer.await.expect("writer");
                    black_box(received)
                })
            })
        });
    }
    group.finish();
}

fn bench_split_fan_out(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("kernel-split");

    for width in [2usize, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter(|| {
                rt.block_on(async {
                    let kernel = Kernel::new();
                    let source = kernel.create_pipe(PipeOptions::default()).expect("pipe");
                    let sinks: Vec<_> = (0..width)
                        .map(|_| kernel.create_pipe(PipeOptions::default()).expect("pipe"))
                        .collect();
                    let _edge = kernel.split(&source, &sinks).expect("split");
                    let readers: Vec<_> = sinks
                        .into_iter()
                        .map(|sink| tokio::spawn(async move { sink.collect().await.len() }))
                        .collect();
                    for i in 0..200u64 {
                        source.write(Chunk::Text(i.to_string())).await.expect("write");
                    }
                    source.end();
                    let mut total = 0;
                    for reader in readers {
                        total += reader.await.expect("reader");
                    }
                    black_box(total)
                })
            })
        });
    }
    group.finish();
}

// ============================================================================
// ROUTING DIRECTORY
// ============================================================================

fn bench_announce_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("router-announce-resolve");
    let dir = RoutingDirectory::new(RouterConfig::default());
    for i in 0..1_000 {
        dir.announce(RoutingAnnouncement::new(
            format!("svc-{i}"),
            "inproc",
            format!("node:svc-{i}"),
        ))
        .expect("announce");
    }

    group.bench_function("announce_existing", |b| {
        b.iter(|| {
            dir.announce(RoutingAnnouncement::new("svc-500", "inproc", "node:svc-500"))
                .expect("announce")
        })
    });
    group.bench_function("resolve_1000", |b| {
        b.iter(|| black_box(dir.resolve("node:svc-999")))
    });
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("router-sweep");
    group.bench_function("half_expired_1000", |b| {
        b.iter_with_setup(
            || {
                let clock = ManualTimeSource::new(0);
                let dir = RoutingDirectory::with_time_source(
                    RouterConfig::default().with_ttl_ms(1_000),
                    Arc::new(clock.clone()),
                );
                for i in 0..1_000 {
                    if i == 500 {
                        clock.advance(600);
                    }
                    dir.announce(RoutingAnnouncement::new(
                        format!("svc-{i}"),
                        "inproc",
                        format!("node:svc-{i}"),
                    ))
                    .expect("announce");
                }
                clock.advance(600);
                dir
            },
            |dir| black_box(dir.sweep().len()),
        )
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_connect_chain,
    bench_split_fan_out,
    bench_announce_resolve,
    bench_sweep
);
criterion_main!(benches);
