//! Performance benchmarks for transfer operations

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use huffstream_core::{Ack, FramedChannel, TransferProtocol};
use huffstream_integration_tests::{DiscardSink, connect, sample_text, start_server, test_config};
use huffstream_transport::memory_pair;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Benchmark framed send/receive of a container over an in-memory pipe
fn bench_framed_transfer(c: &mut Criterion) {
    let rt = runtime();
    let protocol = TransferProtocol::new(&test_config(1));
    let mut group = c.benchmark_group("framed_transfer");

    for size in [
        64 * 1024,   // 64 KB
        1024 * 1024, // 1 MB
    ] {
        let container = huffstream_codec::compress(&sample_text(size)).unwrap();
        group.throughput(Throughput::Bytes(container.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &container, |b, container| {
            b.iter(|| {
                rt.block_on(async {
                    let (client, server) = memory_pair(64 * 1024);
                    let mut sender = FramedChannel::new(client, 4096);
                    let mut receiver = FramedChannel::new(server, 4096);

                    let send = protocol.send(&mut sender, "bench.huff", container, |_| {});
                    let receive = async {
                        let pending = protocol.receive(&mut receiver).await.unwrap();
                        pending.acknowledge(Ack::Complete).await.unwrap()
                    };
                    let (sent, message) = tokio::join!(send, receive);
                    sent.unwrap();
                    black_box(message.body.len())
                })
            });
        });
    }

    group.finish();
}

/// Benchmark a full session transfer over loopback TCP
fn bench_session_transfer(c: &mut Criterion) {
    let rt = runtime();
    let server = rt.block_on(start_server(test_config(4), Arc::new(DiscardSink)));
    let mut client = rt.block_on(connect(&server)).unwrap();
    let data = sample_text(256 * 1024);

    let mut group = c.benchmark_group("session_transfer");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("256KB", |b| {
        b.iter(|| {
            let report = rt.block_on(client.send("bench.txt", &data)).unwrap();
            black_box(report.stats.container_size)
        });
    });
    group.finish();

    rt.block_on(async {
        client.close().await.unwrap();
        server.shutdown().await;
    });
}

criterion_group!(benches, bench_framed_transfer, bench_session_transfer);
criterion_main!(benches);
