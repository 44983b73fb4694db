use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use p2term_core::{Core, CoreConfig, MessageType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MSG_COUNT: u64 = 200_000;

fn cog_line(cog: u8, n: u64) -> Vec<u8> {
    format!("Cog{cog}  line {n}\r\n").into_bytes()
}

fn bench_cog_message_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("cog_message");
    group.throughput(Throughput::Elements(MSG_COUNT));

    group.bench_function("single_cog", |b| {
        b.iter(|| {
            let core = Core::new(CoreConfig::default(), Arc::new(p2term_core::NullEventListener));
            let seen = Arc::new(AtomicU64::new(0));
            let seen_in_sink = seen.clone();
            let core_for_sink = core.clone();
            core.register_sink(
                MessageType::CogMessage { cog: 0 },
                Box::new(move |handle| {
                    black_box(handle.data());
                    core_for_sink.release(handle.slot_id());
                    seen_in_sink.fetch_add(1, Ordering::Relaxed);
                }),
            );
            core.start();

            for n in 0..MSG_COUNT {
                core.on_serial_bytes(&cog_line(0, n));
            }

            let deadline = Instant::now() + Duration::from_secs(30);
            while seen.load(Ordering::Relaxed) < MSG_COUNT && Instant::now() < deadline {
                std::thread::yield_now();
            }
            core.stop();
        });
    });

    group.finish();
}

fn bench_fanout_widths(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout_widths");

    for cogs in [2u8, 4, 8].iter() {
        let total = MSG_COUNT;
        group.throughput(Throughput::Elements(total));

        group.bench_with_input(BenchmarkId::from_parameter(format!("{cogs}_cogs")), cogs, |b, &n_cogs| {
            b.iter(|| {
                let core = Core::new(CoreConfig::high_throughput(), Arc::new(p2term_core::NullEventListener));
                let seen = Arc::new(AtomicU64::new(0));
                for cog in 0..n_cogs {
                    let seen_in_sink = seen.clone();
                    let core_for_sink = core.clone();
                    core.register_sink(
                        MessageType::CogMessage { cog },
                        Box::new(move |handle| {
                            black_box(handle.data());
                            core_for_sink.release(handle.slot_id());
                            seen_in_sink.fetch_add(1, Ordering::Relaxed);
                        }),
                    );
                }
                core.start();

                for i in 0..total {
                    let cog = (i % n_cogs as u64) as u8;
                    core.on_serial_bytes(&cog_line(cog, i));
                }

                let deadline = Instant::now() + Duration::from_secs(30);
                while seen.load(Ordering::Relaxed) < total && Instant::now() < deadline {
                    std::thread::yield_now();
                }
                core.stop();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cog_message_throughput, bench_fanout_widths);
criterion_main!(benches);
