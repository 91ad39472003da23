//! Cloth drape example: a square sheet pinned along one edge falls onto a
//! sphere and a ground plane.

use pbd::{
    ClothConfig, ClothingSimulation, Implicit, RigidTransform, SimulationContext, Vec3,
    pbd_constraints::GroundConstraint,
};

const SIZE: usize = 16;
const SPACING: f64 = 2.0;

fn main() {
    let mut positions = Vec::new();
    for j in 0..SIZE {
        for i in 0..SIZE {
            positions.push(Vec3::new(i as f64 * SPACING, j as f64 * SPACING, 40.0));
        }
    }
    let mut triangles = Vec::new();
    for j in 0..SIZE - 1 {
        for i in 0..SIZE - 1 {
            let a = j * SIZE + i;
            triangles.push([a, a + 1, a + SIZE + 1]);
            triangles.push([a, a + SIZE + 1, a + SIZE]);
        }
    }
    // Row y = 0 is pinned, the rest is free.
    let max_distances: Vec<f64> = positions
        .iter()
        .map(|p| if p.y == 0.0 { 0.0 } else { 100.0 })
        .collect();

    let config = ClothConfig {
        use_bending_elements: true,
        ..Default::default()
    };
    let mut cloth = ClothingSimulation::new(config).expect("valid cloth config");
    let index = cloth
        .add_cloth(&positions, &max_distances, &triangles)
        .expect("valid cloth mesh");
    let center = Vec3::new(15.0, 20.0, 20.0);
    cloth.add_collision_proxy(Implicit::sphere(8.0), RigidTransform::from_translation(center));
    cloth.evolution_mut().add_constraint_rule(GroundConstraint::new(0.0));

    println!("Cloth drape simulation");
    println!("Particles: {}", positions.len());
    println!("Triangles: {}\n", triangles.len());

    let context = SimulationContext {
        delta_time: 1.0 / 30.0,
        positions: positions.clone(),
        transforms: vec![RigidTransform::from_translation(center)],
    };

    for frame in 0..=90 {
        if frame % 15 == 0 {
            let data = &cloth.simulation_data()[index];
            let lowest = data.positions.iter().map(|p| p.z).fold(f64::INFINITY, f64::min);
            let corner = data.positions[SIZE * SIZE - 1];
            println!(
                "frame {frame:3}  lowest z = {lowest:8.3}  far corner = ({:7.3}, {:7.3}, {:7.3})",
                corner.x, corner.y, corner.z
            );
        }
        cloth.simulate(&context);
    }
}
