// Single-step throughput of the host integrators
// ────────────────────────────────────────────────────────────────────────────────
// One sample = one full O(n²) step. Throughput is reported in pair interactions
// so different body counts are comparable.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use nbody_core::{ForceIntegrator, ParallelIntegrator, ParticleState, ReferenceIntegrator, SimulationParameters};
use rand::SeedableRng;
use rand::rngs::StdRng;

use std::time::Duration;

const COUNTS: [usize; 3] = [1024, 2048, 4096];

// ───────────────────────────────────────────────────────────── benchmark fn ────
fn bench_integrate(c: &mut Criterion) {
    let mut g = c.benchmark_group("integrate_step");

    for &count in &COUNTS {
        let params = SimulationParameters { count, ..Default::default() };
        let state = ParticleState::generate(&params, &mut StdRng::seed_from_u64(params.seed));
        g.throughput(Throughput::Elements(params.interactions_per_step()));

        for use_local in [false, true] {
            let p = SimulationParameters { use_local, ..params.clone() };
            let mut integrator = ParallelIntegrator::new(None, &p).unwrap();
            let label = if use_local { "parallel_local" } else { "parallel" };

            g.bench_with_input(BenchmarkId::new(label, count), &state, |b, state| {
                b.iter_batched(
                    /* ----------- Setup: fresh buffers per sample ----------- */
                    || (state.positions.clone(), state.velocities.clone(), state.positions.clone()),
                    /* ------------------- Measured body --------------------- */
                    |(input, mut vel, mut out)| {
                        integrator
                            .integrate(&input, &mut vel, &mut out, count, p.delta, p.softening)
                            .unwrap();
                        out
                    },
                    BatchSize::LargeInput,
                )
            });
        }

        // sequential baseline, only for the smallest size
        if count == COUNTS[0] {
            let mut reference = ReferenceIntegrator::default();
            g.bench_with_input(BenchmarkId::new("reference", count), &state, |b, state| {
                b.iter_batched(
                    || (state.positions.clone(), state.velocities.clone(), state.positions.clone()),
                    |(input, mut vel, mut out)| {
                        reference
                            .integrate(&input, &mut vel, &mut out, count, params.delta, params.softening)
                            .unwrap();
                        out
                    },
                    BatchSize::LargeInput,
                )
            });
        }
    }

    g.finish();
}

// ─────────────────────────────────────────────────────────── Criterion config ──
fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_secs(2))
        .measurement_time(Duration::from_secs(8))
        .sample_size(20)
        .configure_from_args()
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_integrate
}
criterion_main!(benches);
