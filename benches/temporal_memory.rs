//! Benchmarks for the temporal memory hot paths.
//!
//! Run with: `cargo bench --bench temporal_memory`

use ahash::AHashSet;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sequence_memory::prelude::*;

/// Builds a fixed cycle of random sparse patterns.
fn make_sequence(columns: u32, active: usize, length: usize, rng: &mut Random) -> Vec<Vec<UInt>> {
    (0..length)
        .map(|_| {
            let mut pattern = rng.sample((0..columns).collect::<Vec<UInt>>(), active);
            pattern.sort_unstable();
            pattern
        })
        .collect()
}

// =============================================================================
// TEMPORAL MEMORY BENCHMARKS
// =============================================================================

fn bench_tm_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("tm_compute");

    let mut rng = Random::new(42);

    for (columns, cells) in &[(512u32, 8u32), (2048, 16), (2048, 32)] {
        let active = (*columns as usize) / 50;
        let sequence = make_sequence(*columns, active, 20, &mut rng);

        let mut tm = TemporalMemory::new(TemporalMemoryParams {
            column_count: *columns,
            cells_per_column: *cells,
            ..Default::default()
        })
        .unwrap();

        // Warm up so the benchmark measures a model with learned segments.
        for _ in 0..10 {
            for pattern in &sequence {
                tm.compute(pattern, true).unwrap();
            }
        }

        group.throughput(Throughput::Elements(sequence.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("learn", format!("{columns}x{cells}")),
            &sequence,
            |b, sequence| {
                b.iter(|| {
                    for pattern in sequence {
                        black_box(tm.compute(pattern, true).unwrap());
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("infer", format!("{columns}x{cells}")),
            &sequence,
            |b, sequence| {
                b.iter(|| {
                    tm.reset();
                    for pattern in sequence {
                        black_box(tm.compute(pattern, false).unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// CONNECTIONS BENCHMARKS
// =============================================================================

fn populated_connections(rng: &mut Random) -> Connections {
    let num_cells = 16_384;
    let mut connections = Connections::with_cells(num_cells).unwrap();
    let candidates: Vec<CellIdx> = (0..num_cells).collect();

    for cell in (0..num_cells).step_by(4) {
        let segment = connections.create_segment(cell).unwrap();
        let presynaptic = rng.sample(candidates.clone(), 32);
        for presynaptic_cell in presynaptic {
            let perm = (rng.get_usize(99) + 1) as Permanence / 100.0;
            connections
                .create_synapse(segment, presynaptic_cell, perm)
                .unwrap();
        }
    }
    connections
}

fn bench_compute_activity(c: &mut Criterion) {
    let mut group = c.benchmark_group("connections_activity");

    let mut rng = Random::new(7);
    let connections = populated_connections(&mut rng);
    let candidates: Vec<CellIdx> = (0..connections.num_cells() as CellIdx).collect();

    for active_count in &[64usize, 328, 1024] {
        let mut active = rng.sample(candidates.clone(), *active_count);
        active.sort_unstable();
        let active_set: AHashSet<CellIdx> = active.iter().copied().collect();

        group.throughput(Throughput::Elements(*active_count as u64));
        group.bench_with_input(
            BenchmarkId::new("bulk", active_count),
            &active,
            |b, active| {
                b.iter(|| black_box(connections.compute_activity(active)));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("per_segment", active_count),
            &active_set,
            |b, active_set| {
                b.iter(|| {
                    let mut total = 0;
                    for segment in connections.iter_segments() {
                        total += connections
                            .num_active_potential_synapses(segment, active_set)
                            .unwrap();
                    }
                    black_box(total)
                });
            },
        );
    }

    group.finish();
}

fn bench_adapt_segment(c: &mut Criterion) {
    let mut rng = Random::new(11);
    let mut connections = populated_connections(&mut rng);
    let segments: Vec<Segment> = connections.iter_segments().take(256).collect();
    let context: AHashSet<CellIdx> = (0..4096).collect();

    c.bench_function("adapt_segment", |b| {
        b.iter(|| {
            for &segment in &segments {
                // Tiny deltas keep every synapse alive across iterations.
                black_box(
                    connections
                        .adapt_segment(segment, &context, 0.0001, 0.0)
                        .unwrap(),
                );
            }
        });
    });
}

criterion_group!(tm_benches, bench_tm_compute);
criterion_group!(connections_benches, bench_compute_activity, bench_adapt_segment);

criterion_main!(tm_benches, connections_benches);
