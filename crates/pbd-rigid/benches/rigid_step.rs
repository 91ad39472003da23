//! Criterion benchmarks for the rigid step.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pbd_geometry::Implicit;
use pbd_math::Vec3;
use pbd_particles::{RigidBodyDesc, RigidParticles, sphere_inertia};
use pbd_rigid::{PbdRigidsEvolution, RigidEvolutionConfig};

/// A `side` x `side` grid of ball columns `height` tall on a floor plane.
fn make_pile(side: usize, height: usize) -> PbdRigidsEvolution {
    let mut particles = RigidParticles::new();
    particles.add(RigidBodyDesc::fixed().with_geometry(Implicit::plane(Vec3::zeros(), Vec3::z())));
    for i in 0..side {
        for j in 0..side {
            for k in 0..height {
                particles.add(
                    RigidBodyDesc::dynamic(1.0)
                        .with_inertia(sphere_inertia(1.0, 1.0))
                        .with_position(Vec3::new(3.0 * i as f64, 3.0 * j as f64, 1.0 + 2.1 * k as f64))
                        .with_geometry(Implicit::sphere(1.0)),
                );
            }
        }
    }
    let config = RigidEvolutionConfig {
        graph: pbd_contact::ContactGraphConfig {
            sleep: pbd_contact::SleepConfig {
                counter_threshold: usize::MAX,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };
    match PbdRigidsEvolution::new(particles, config) {
        Ok(evolution) => evolution,
        Err(e) => panic!("bench setup: {e}"),
    }
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("rigid_step");
    for &(side, height) in &[(4, 4), (8, 8), (16, 4)] {
        let mut evolution = make_pile(side, height);
        let label = format!("{side}x{side}x{height}");
        group.bench_with_input(BenchmarkId::new("ball_pile", &label), &label, |b, _| {
            b.iter(|| evolution.advance_one_time_step(1.0 / 60.0))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
