//! Criterion benchmarks for a hanging cloth frame.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pbd_evolution::{ClothConfig, ClothingSimulation, SimulationContext};
use pbd_math::Vec3;

fn make_cloth(n: usize, self_collisions: bool) -> (ClothingSimulation, SimulationContext) {
    let mut positions = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            positions.push(Vec3::new(i as f64 * 2.0, j as f64 * 2.0, 0.0));
        }
    }
    let mut triangles = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let a = j * n + i;
            triangles.push([a, a + 1, a + n + 1]);
            triangles.push([a, a + n + 1, a + n]);
        }
    }
    let max_distances: Vec<f64> = (0..n * n)
        .map(|k| if k >= n * (n - 1) { 0.0 } else { 50.0 })
        .collect();

    let config = ClothConfig {
        iterations: 4,
        use_self_collisions: self_collisions,
        self_collision_thickness: 0.5,
        ..Default::default()
    };
    let mut sim = ClothingSimulation::new(config).expect("valid config");
    sim.add_cloth(&positions, &max_distances, &triangles)
        .expect("valid cloth");
    let context = SimulationContext {
        delta_time: 1.0 / 60.0,
        positions,
        ..Default::default()
    };
    (sim, context)
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("cloth_frame");
    for &n in &[16, 32, 64] {
        let (mut sim, context) = make_cloth(n, false);
        group.bench_with_input(BenchmarkId::new("springs", n), &n, |b, _| {
            b.iter(|| sim.simulate(&context))
        });
        let (mut sim, context) = make_cloth(n, true);
        group.bench_with_input(BenchmarkId::new("self_collision", n), &n, |b, _| {
            b.iter(|| sim.simulate(&context))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_frame);
criterion_main!(benches);
