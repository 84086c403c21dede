use std::time::Instant;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use forgecast::merge::FixedInterval;
use forgecast::{
    Distribution, Inventory, ItemKind, OrderedMerge, Process, Scheduler, SchedulerConfig, SimTime,
};

fn kind(name: &str) -> ItemKind {
    ItemKind::new(name).unwrap()
}

/// A small production chain whose branches stay distinct for a while.
fn make_scheduler(parallel: bool) -> Scheduler {
    let processes = vec![
        Process::builder("mine")
            .duration(1.0)
            .success_probability(0.7)
            .damages_items(kind("Pick"), 0.15)
            .produces_items(kind("Ore"), 2)
            .build()
            .unwrap(),
        Process::builder("smelt")
            .duration(2.0)
            .success_probability(0.8)
            .consumes_items(kind("Ore"), 3)
            .produces_items(kind("Bar"), 1)
            .build()
            .unwrap(),
        Process::builder("forge")
            .duration(3.0)
            .success_probability(0.6)
            .consumes_items(kind("Bar"), 2)
            .produces_items(kind("Sword"), 1)
            .build()
            .unwrap(),
    ];
    let config = SchedulerConfig {
        follow_completions: false,
        parallel,
        ..SchedulerConfig::default()
    };
    let inventory = Inventory::from_stacks([(kind("Pick"), 2), (kind("Ore"), 3)]);
    Scheduler::new(processes, inventory, config).unwrap()
}

fn bench_scheduling_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduling/run");

    for steps in [8_u32, 16] {
        for parallel in [false, true] {
            let label = if parallel { "parallel" } else { "sequential" };
            group.throughput(Throughput::Elements(u64::from(steps)));
            group.bench_with_input(BenchmarkId::new(label, steps), &steps, |b, &steps| {
                b.iter_custom(|iters| {
                    let mut total = std::time::Duration::ZERO;
                    for _ in 0..iters {
                        // Fresh scheduler per iteration so distributions do not accumulate.
                        let mut scheduler = make_scheduler(parallel);
                        let end = Some(SimTime::from(steps));
                        let ticks = FixedInterval::new(SimTime::ZERO, 1.0, end).unwrap();
                        let start = Instant::now();
                        scheduler.run([ticks]).unwrap();
                        total += start.elapsed();
                    }
                    total
                });
            });
        }
    }

    group.finish();
}

fn bench_distribution_map(c: &mut Criterion) {
    let dist: Distribution<u32> = (0..4096_u32).map(|i| (i, 1.0 / 4096.0)).collect();

    c.bench_function("distribution/map_merge", |b| {
        b.iter(|| dist.map(|s| Distribution::from_entries([(s / 2, 0.5), (s / 3, 0.5)])));
    });
}

fn bench_ordered_merge(c: &mut Criterion) {
    let sources: Vec<Vec<u32>> =
        (0..16_u32).map(|k| (0..1024).map(|i| i * 16 + k).collect()).collect();

    let mut group = c.benchmark_group("merge");
    group.throughput(Throughput::Elements(16 * 1024));
    group.bench_function("ordered_merge_16x1024", |b| {
        b.iter(|| OrderedMerge::new(sources.iter().map(|s| s.iter().copied())).count());
    });
    group.finish();
}

criterion_group!(scheduling, bench_scheduling_run, bench_distribution_map, bench_ordered_merge);
criterion_main!(scheduling);
