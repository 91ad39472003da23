//! Rigid stack example: a column of boxes and a clustered pair of balls
//! land on the floor, collide, break apart and go to sleep.

use pbd::{
    Implicit, PbdRigidsEvolution, RigidBodyDesc, RigidEvolutionConfig, RigidParticles, Vec3,
    pbd_particles::{box_inertia, sphere_inertia},
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

fn main() {
    let config = RigidEvolutionConfig {
        restitution: 0.2,
        ..Default::default()
    };
    let mut evolution =
        PbdRigidsEvolution::new(RigidParticles::new(), config).expect("valid rigid config");

    evolution.add_body(
        RigidBodyDesc::fixed().with_geometry(Implicit::plane(Vec3::zeros(), Vec3::z())),
    );

    let half = Vec3::new(5.0, 5.0, 5.0);
    let mut boxes = Vec::new();
    for level in 0..4 {
        let body = RigidBodyDesc::dynamic(8.0)
            .with_inertia(box_inertia(8.0, &half))
            .with_position(Vec3::new(0.0, 0.0, 5.0 + 10.5 * level as f64))
            .with_geometry(Implicit::cuboid(half));
        boxes.push(evolution.add_body(body));
    }

    let ball = |x: f64| {
        RigidBodyDesc::dynamic(1.0)
            .with_inertia(sphere_inertia(1.0, 3.0))
            .with_position(Vec3::new(x, 30.0, 60.0))
            .with_geometry(Implicit::sphere(3.0))
    };
    let left = evolution.add_body(ball(-3.0));
    let right = evolution.add_body(ball(3.0));
    let cluster = evolution
        .create_cluster(&[left, right], 50.0)
        .expect("two dynamic children");

    let impacts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&impacts);
    evolution.set_collision_callback(move |events| {
        counter.fetch_add(events.len(), Ordering::Relaxed);
    });
    evolution.set_break_callback(|events| {
        for event in events {
            println!(
                "  cluster {} released body {} (strain {:.1})",
                event.cluster, event.particle, event.strain
            );
        }
    });

    println!("Rigid stack simulation");
    println!("Boxes: {}", boxes.len());
    println!("Cluster: {cluster} with children {left} and {right}\n");

    let dt = 1.0 / 60.0;
    for frame in 0..=240 {
        if frame % 30 == 0 {
            let particles = evolution.particles();
            let top = particles.x[boxes[boxes.len() - 1]];
            let sleeping = particles.sleeping.iter().filter(|&&s| s).count();
            println!(
                "t = {:5.2}s  top box z = {:7.3}  sleeping = {sleeping}  islands = {}  impacts = {}",
                evolution.time(),
                top.z,
                evolution.graph().islands().len(),
                impacts.load(Ordering::Relaxed)
            );
        }
        evolution.advance_one_time_step(dt);
    }
}
