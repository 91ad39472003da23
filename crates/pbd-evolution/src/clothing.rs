//! Cloth driven by animation.
//!
//! A [`ClothingSimulation`] owns one [`PbdEvolution`]. Each cloth appends
//! its particles and the constraint rules selected by [`ClothConfig`];
//! every frame, [`ClothingSimulation::simulate`] receives new animation
//! targets and advances in sub-steps of at most `max_delta_time`, with
//! kinematic particles and collision proxies blended from the previous
//! frame's targets to the new ones.

use crate::{ClothConfig, EvolutionError, PbdEvolution, PerParticleGravity, Result};
use pbd_constraints::{
    AxialSpringConstraints, BendingConstraints, ConstraintError, ConstraintRule, LongRangeConstraints,
    SharedPositions, ShapeConstraints, SpringConstraints, VolumeConstraint,
};
use pbd_geometry::{Convex, HalfSpace, Implicit};
use pbd_math::{RigidTransform, Vec3};
use pbd_mesh::TriangleMesh;
use pbd_particles::PbdParticles;
use std::ops::Range;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Animation input for one frame.
#[derive(Debug, Clone, Default)]
pub struct SimulationContext {
    pub delta_time: f64,
    /// Skinned target per particle. Missing entries keep their last value.
    pub positions: Vec<Vec3>,
    /// Target per collision proxy, in proxy order.
    pub transforms: Vec<RigidTransform>,
}

/// Simulated state of one cloth.
#[derive(Debug, Clone, PartialEq)]
pub struct ClothData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

#[derive(Debug, Default)]
struct AnimationState {
    old_positions: Vec<Vec3>,
    positions: Vec<Vec3>,
    old_transforms: Vec<RigidTransform>,
    transforms: Vec<RigidTransform>,
    frame_start: f64,
    frame_dt: f64,
}

impl AnimationState {
    fn alpha(&self, local_time: f64) -> f64 {
        if self.frame_dt <= 0.0 {
            return 1.0;
        }
        ((local_time - self.frame_start) / self.frame_dt).clamp(0.0, 1.0)
    }
}

#[derive(Debug)]
struct Cloth {
    range: Range<usize>,
    mesh: TriangleMesh,
    targets: Option<SharedPositions>,
}

#[derive(Debug)]
pub struct ClothingSimulation {
    evolution: PbdEvolution,
    config: ClothConfig,
    cloths: Vec<Cloth>,
    animation: Arc<RwLock<AnimationState>>,
    /// Proxies driven by animation; external shapes follow them.
    proxy_count: usize,
    external: Vec<Implicit>,
}

impl ClothingSimulation {
    pub fn new(config: ClothConfig) -> Result<Self> {
        let mut evolution = PbdEvolution::new(PbdParticles::new(), config.evolution())?;
        evolution.add_force_rule(PerParticleGravity::new(-Vec3::z(), config.gravity));

        let animation = Arc::new(RwLock::new(AnimationState::default()));
        let state = animation.clone();
        evolution.set_kinematic_update(move |i, _dt, local_time| {
            let state = state.read().unwrap_or_else(|e| e.into_inner());
            let alpha = state.alpha(local_time);
            let old = state.old_positions.get(i)?;
            let new = state.positions.get(i)?;
            Some(old + (new - old) * alpha)
        });
        let state = animation.clone();
        evolution.set_collision_kinematic_update(move |j, _dt, local_time| {
            let state = state.read().unwrap_or_else(|e| e.into_inner());
            let alpha = state.alpha(local_time);
            let old = state.old_transforms.get(j)?;
            let new = state.transforms.get(j)?;
            Some(old.blend(new, alpha))
        });

        Ok(Self {
            evolution,
            config,
            cloths: Vec::new(),
            animation,
            proxy_count: 0,
            external: Vec::new(),
        })
    }

    pub fn config(&self) -> &ClothConfig {
        &self.config
    }

    pub fn evolution(&self) -> &PbdEvolution {
        &self.evolution
    }

    pub fn evolution_mut(&mut self) -> &mut PbdEvolution {
        &mut self.evolution
    }

    pub fn cloth_count(&self) -> usize {
        self.cloths.len()
    }

    /// Particle range of cloth `index`.
    pub fn cloth_range(&self, index: usize) -> Range<usize> {
        self.cloths[index].range.clone()
    }

    /// Append a cloth. `triangles` index into `positions`. A particle whose
    /// max distance is at or below the configured threshold is kinematic
    /// and follows its animation target.
    pub fn add_cloth(
        &mut self,
        positions: &[Vec3],
        max_distances: &[f64],
        triangles: &[[usize; 3]],
    ) -> Result<usize> {
        let config = &self.config;
        if config.use_tetrahedral_constraints {
            return Err(EvolutionError::Unsupported(
                "tetrahedral constraints".to_string(),
            ));
        }
        if max_distances.len() != positions.len() {
            return Err(EvolutionError::LengthMismatch {
                what: "max distances",
                expected: positions.len(),
                found: max_distances.len(),
            });
        }
        for (t, tri) in triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i >= positions.len()) {
                return Err(ConstraintError::IndexOutOfBounds {
                    constraint: t,
                    index,
                    count: positions.len(),
                }
                .into());
            }
        }

        let mut masses = vec![0.0; positions.len()];
        for &[a, b, c] in triangles {
            let area = 0.5 * (positions[b] - positions[a]).cross(&(positions[c] - positions[a])).norm();
            for v in [a, b, c] {
                masses[v] += config.density * area / 3.0;
            }
        }

        let offset = self.evolution.particles().len();
        for (k, &x) in positions.iter().enumerate() {
            let mass = if max_distances[k] <= config.kinematic_max_distance {
                0.0
            } else {
                masses[k]
            };
            self.evolution.particles_mut().add_particle(x, mass);
        }
        let range = offset..offset + positions.len();
        let mesh = TriangleMesh::new(
            triangles
                .iter()
                .map(|t| t.map(|i| i + offset))
                .collect(),
        );

        let animated = {
            let mut state = self.animation.write().unwrap_or_else(|e| e.into_inner());
            let animated = state.positions.len();
            state.old_positions.extend_from_slice(positions);
            state.positions.extend_from_slice(positions);
            animated
        };

        let config = self.config.clone();
        let (rules, targets) = match cloth_rules(&config, self.evolution.particles(), &mesh, range.clone()) {
            Ok(built) => built,
            Err(error) => {
                self.evolution.particles_mut().truncate(offset);
                let mut state = self.animation.write().unwrap_or_else(|e| e.into_inner());
                state.old_positions.truncate(animated);
                state.positions.truncate(animated);
                warn!(%error, "rejected cloth");
                return Err(error);
            }
        };
        let evolution = &mut self.evolution;
        for rule in rules {
            evolution.add_boxed_constraint_rule(rule);
        }

        if config.use_self_collisions {
            let mut all = evolution.collision_triangles().to_vec();
            all.extend_from_slice(mesh.elements());
            evolution.set_collision_triangles(all)?;
            let neighbors = mesh.point_to_neighbors();
            let disabled = evolution.disabled_collision_elements_mut();
            for i in mesh.vertices() {
                for j in mesh.n_ring(&neighbors, i, config.self_collision_rings) {
                    disabled.insert((i.min(j), i.max(j)));
                }
            }
        }

        debug!(
            cloth = self.cloths.len(),
            particles = positions.len(),
            triangles = triangles.len(),
            rules = self.evolution.constraint_rule_count(),
            "added cloth"
        );
        self.cloths.push(Cloth {
            range,
            mesh,
            targets,
        });
        Ok(self.cloths.len() - 1)
    }

    /// Add an animated collision proxy.
    pub fn add_collision_proxy(&mut self, shape: Implicit, transform: RigidTransform) -> usize {
        self.evolution.truncate_collision_particles(self.proxy_count);
        let index = self.evolution.add_collision_particle(shape, transform);
        self.proxy_count += 1;
        {
            let mut state = self.animation.write().unwrap_or_else(|e| e.into_inner());
            state.old_transforms.push(transform);
            state.transforms.push(transform);
        }
        self.restore_external();
        index
    }

    /// Add world-space spheres `(center, radius)` and convexes (plane
    /// lists) that collide until cleared. Returns their proxy indices.
    pub fn add_external_collisions(
        &mut self,
        spheres: &[(Vec3, f64)],
        convexes: Vec<Vec<HalfSpace>>,
    ) -> Range<usize> {
        let start = self.proxy_count + self.external.len();
        self.external.extend(
            spheres
                .iter()
                .map(|&(center, radius)| Implicit::Sphere { center, radius }),
        );
        self.external.extend(
            convexes
                .into_iter()
                .map(|planes| Implicit::Convex(Convex::from_planes(planes))),
        );
        self.restore_external();
        start..self.proxy_count + self.external.len()
    }

    pub fn clear_external_collisions(&mut self) {
        self.external.clear();
        self.evolution.truncate_collision_particles(self.proxy_count);
    }

    fn restore_external(&mut self) {
        self.evolution.truncate_collision_particles(self.proxy_count);
        for shape in &self.external {
            self.evolution
                .add_collision_particle(shape.clone(), RigidTransform::identity());
        }
    }

    /// Proxies touched during the last step.
    pub fn collisions(&self, include_external: bool) -> Vec<usize> {
        self.evolution
            .collided()
            .iter()
            .enumerate()
            .filter(|&(j, &hit)| hit && (include_external || j < self.proxy_count))
            .map(|(j, _)| j)
            .collect()
    }

    /// Advance one animation frame.
    pub fn simulate(&mut self, context: &SimulationContext) {
        let mut dt = context.delta_time;
        if dt < 0.0 || !dt.is_finite() {
            warn!(dt, "ignoring invalid frame time");
            return;
        }
        if dt == 0.0 {
            return;
        }
        if self.config.clamp_delta_time > 0.0 {
            dt = dt.min(self.config.clamp_delta_time);
        }

        {
            let mut guard = self.animation.write().unwrap_or_else(|e| e.into_inner());
            let state = &mut *guard;
            state.old_positions.clone_from(&state.positions);
            for (dst, src) in state.positions.iter_mut().zip(&context.positions) {
                *dst = *src;
            }
            state.old_transforms.clone_from(&state.transforms);
            for (dst, src) in state.transforms.iter_mut().zip(&context.transforms) {
                *dst = *src;
            }
            state.frame_start = self.evolution.time();
            state.frame_dt = dt;

            for cloth in &self.cloths {
                let Some(targets) = &cloth.targets else {
                    continue;
                };
                let mut targets = targets.write().unwrap_or_else(|e| e.into_inner());
                targets.clear();
                targets.extend_from_slice(&state.positions[cloth.range.clone()]);
            }
        }

        let substeps = if self.config.max_delta_time > 0.0 {
            (dt / self.config.max_delta_time).ceil().max(1.0) as usize
        } else {
            1
        };
        let step = dt / substeps as f64;
        debug!(dt, substeps, "simulate frame");
        for _ in 0..substeps {
            self.evolution.advance_one_time_step(step);
        }
    }

    /// Positions and area-weighted normals of every cloth.
    pub fn simulation_data(&self) -> Vec<ClothData> {
        let x = &self.evolution.particles().x;
        self.cloths
            .iter()
            .map(|cloth| {
                let normals = cloth.mesh.point_normals(x);
                ClothData {
                    positions: x[cloth.range.clone()].to_vec(),
                    normals: normals[cloth.range.clone()].to_vec(),
                }
            })
            .collect()
    }
}

/// Constraint rules for one cloth over `range`, in solve order with the
/// shape target first.
fn cloth_rules(
    config: &ClothConfig,
    particles: &PbdParticles,
    mesh: &TriangleMesh,
    range: Range<usize>,
) -> Result<(Vec<Box<dyn ConstraintRule>>, Option<SharedPositions>)> {
    let mut rules: Vec<Box<dyn ConstraintRule>> = Vec::new();
    let targets = if config.shape_target_stiffness > 0.0 {
        let rest = range.clone().map(|i| particles.x[i]).collect();
        let targets: SharedPositions = Arc::new(RwLock::new(rest));
        rules.push(Box::new(ShapeConstraints::new(
            particles,
            range.collect(),
            targets.clone(),
            config.shape_target_stiffness,
        )?));
        Some(targets)
    } else {
        None
    };
    if config.edge_stiffness > 0.0 {
        rules.push(Box::new(SpringConstraints::from_edges(particles, mesh, config.edge_stiffness)?));
    }
    if config.bending_stiffness > 0.0 {
        if config.use_bending_elements {
            rules.push(Box::new(BendingConstraints::from_mesh(particles, mesh, config.bending_stiffness)?));
        } else {
            rules.push(Box::new(SpringConstraints::new(
                particles,
                mesh.unique_adjacent_points(),
                config.bending_stiffness,
            )?));
        }
    }
    if config.area_stiffness > 0.0 {
        rules.push(Box::new(AxialSpringConstraints::new(
            particles,
            mesh.elements(),
            config.area_stiffness,
        )?));
    }
    if config.volume_stiffness > 0.0 {
        if config.use_thin_shell_volume_constraints {
            rules.push(Box::new(SpringConstraints::new(
                particles,
                mesh.double_adjacent_points(),
                config.volume_stiffness,
            )?));
        } else {
            rules.push(Box::new(VolumeConstraint::new(
                particles,
                mesh.elements().to_vec(),
                config.volume_stiffness,
            )?));
        }
    }
    if config.strain_limiting_stiffness > 0.0 {
        rules.push(Box::new(LongRangeConstraints::new(
            particles,
            mesh,
            config.strain_limiting_stiffness,
            config.long_range_mode,
        )?));
    }
    Ok((rules, targets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// `n` x `n` grid in the XY plane with spacing `h`.
    fn grid(n: usize, h: f64) -> (Vec<Vec3>, Vec<[usize; 3]>) {
        let mut positions = Vec::new();
        for j in 0..n {
            for i in 0..n {
                positions.push(Vec3::new(i as f64 * h, j as f64 * h, 0.0));
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
        (positions, triangles)
    }

    /// Top row (largest y) pinned.
    fn pinned(n: usize) -> Vec<f64> {
        (0..n * n).map(|k| if k >= n * (n - 1) { 0.0 } else { 100.0 }).collect()
    }

    fn frame(dt: f64) -> SimulationContext {
        SimulationContext {
            delta_time: dt,
            ..Default::default()
        }
    }

    #[test]
    fn hanging_cloth_respects_tethers() {
        let (positions, triangles) = grid(4, 10.0);
        let mut sim = ClothingSimulation::new(ClothConfig::default()).expect("valid");
        let cloth = sim.add_cloth(&positions, &pinned(4), &triangles).expect("valid");
        let context = SimulationContext {
            delta_time: 1.0 / 30.0,
            positions: positions.clone(),
            ..Default::default()
        };
        for _ in 0..20 {
            sim.simulate(&context);
        }
        let data = &sim.simulation_data()[cloth];
        for k in 12..16 {
            assert_relative_eq!(data.positions[k], positions[k], epsilon = 1e-9);
        }
        assert!(data.positions[0].z < 0.0);
        // The bottom corner sits directly below its nearest anchor at 30.
        let reach = (data.positions[0] - positions[12]).norm();
        assert!(reach <= 30.0 + 1e-9, "stretched to {reach}");
    }

    #[test]
    fn kinematic_particles_track_animation() {
        let (positions, triangles) = grid(3, 10.0);
        let mut sim = ClothingSimulation::new(ClothConfig::default()).expect("valid");
        sim.add_cloth(&positions, &pinned(3), &triangles).expect("valid");
        let moved: Vec<Vec3> = positions.iter().map(|p| p + Vec3::new(5.0, 0.0, 0.0)).collect();
        sim.simulate(&SimulationContext {
            delta_time: 0.1,
            positions: moved.clone(),
            ..Default::default()
        });
        let x = &sim.evolution().particles().x;
        for k in 6..9 {
            assert_relative_eq!(x[k], moved[k], epsilon = 1e-9);
        }
    }

    #[test]
    fn frames_are_split_into_substeps() {
        let config = ClothConfig {
            max_delta_time: 0.01,
            ..Default::default()
        };
        let mut sim = ClothingSimulation::new(config).expect("valid");
        sim.simulate(&frame(0.05));
        assert_relative_eq!(sim.evolution().time(), 0.05, epsilon = 1e-12);
        sim.simulate(&frame(0.0));
        sim.simulate(&frame(-1.0));
        assert_relative_eq!(sim.evolution().time(), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn external_collisions_reported_and_cleared() {
        let (positions, triangles) = grid(3, 10.0);
        let mut sim = ClothingSimulation::new(ClothConfig::default()).expect("valid");
        sim.add_cloth(&positions, &[100.0; 9], &triangles).expect("valid");
        let proxy = sim.add_collision_proxy(
            Implicit::sphere(1.0),
            RigidTransform::from_translation(Vec3::new(100.0, 100.0, 100.0)),
        );
        let external = sim.add_external_collisions(&[(Vec3::new(10.0, 10.0, -5.0), 4.0)], Vec::new());
        assert_eq!(proxy, 0);
        assert_eq!(external, 1..2);

        sim.simulate(&frame(1.0 / 60.0));
        assert_eq!(sim.collisions(true), vec![1]);
        assert!(sim.collisions(false).is_empty());

        sim.clear_external_collisions();
        assert_eq!(sim.evolution().collision_particles().len(), 1);
    }

    #[test]
    fn flat_cloth_normals_are_vertical() {
        let (positions, triangles) = grid(3, 10.0);
        let mut sim = ClothingSimulation::new(ClothConfig::default()).expect("valid");
        sim.add_cloth(&positions, &[0.0; 9], &triangles).expect("valid");
        let data = sim.simulation_data();
        assert_eq!(data.len(), 1);
        for n in &data[0].normals {
            assert_relative_eq!(n.z.abs(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn unsupported_and_mismatched_inputs_rejected() {
        let (positions, triangles) = grid(2, 1.0);
        let config = ClothConfig {
            use_tetrahedral_constraints: true,
            ..Default::default()
        };
        let mut sim = ClothingSimulation::new(config).expect("valid");
        assert!(matches!(
            sim.add_cloth(&positions, &[1.0; 4], &triangles),
            Err(EvolutionError::Unsupported(_))
        ));

        let mut sim = ClothingSimulation::new(ClothConfig::default()).expect("valid");
        assert!(matches!(
            sim.add_cloth(&positions, &[1.0; 3], &triangles),
            Err(EvolutionError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejected_cloth_leaves_simulation_unchanged() {
        let (positions, triangles) = grid(2, 1.0);
        let mut sim = ClothingSimulation::new(ClothConfig::default()).expect("valid");
        sim.add_cloth(&positions, &[100.0; 4], &triangles).expect("valid");
        let particles = sim.evolution().particles().len();
        let rules = sim.evolution().constraint_rule_count();

        let degenerate = [Vec3::zeros(), Vec3::x(), Vec3::y()];
        assert!(matches!(
            sim.add_cloth(&degenerate, &[100.0; 3], &[[0, 0, 1]]),
            Err(EvolutionError::Constraint(ConstraintError::DuplicateIndex { .. }))
        ));
        assert_eq!(sim.cloth_count(), 1);
        assert_eq!(sim.evolution().particles().len(), particles);
        assert_eq!(sim.evolution().constraint_rule_count(), rules);

        let next = sim.add_cloth(&positions, &[100.0; 4], &triangles).expect("valid");
        assert_eq!(sim.cloth_range(next), 4..8);
        sim.simulate(&frame(1.0 / 30.0));
        let data = sim.simulation_data();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].positions.len(), 4);
    }

    #[test]
    fn shape_target_rule_runs_first() {
        let (positions, triangles) = grid(2, 1.0);
        let config = ClothConfig {
            shape_target_stiffness: 1.0,
            ..Default::default()
        };
        let mut particles = PbdParticles::new();
        for &x in &positions {
            particles.add_particle(x, 1.0);
        }
        let mesh = TriangleMesh::new(triangles);
        let (rules, targets) = cloth_rules(&config, &particles, &mesh, 0..4).expect("valid");
        assert!(targets.is_some());
        assert!(rules.len() > 1);

        particles.p[0] = Vec3::new(0.0, 0.0, 1.0);
        rules[0].apply(&mut particles, 0.1);
        assert_relative_eq!(particles.p[0], positions[0], epsilon = 1e-12);
        // An edge rule would have moved the neighbour too.
        assert_eq!(particles.p[1], positions[1]);
    }

    #[test]
    fn self_collisions_exclude_neighbour_rings() {
        let (positions, triangles) = grid(4, 10.0);
        let config = ClothConfig {
            use_self_collisions: true,
            self_collision_rings: 1,
            ..Default::default()
        };
        let mut sim = ClothingSimulation::new(config).expect("valid");
        sim.add_cloth(&positions, &pinned(4), &triangles).expect("valid");
        let evolution = sim.evolution_mut();
        assert_eq!(evolution.collision_triangles().len(), triangles.len());
        let disabled = evolution.disabled_collision_elements_mut();
        assert!(disabled.contains(&(0, 1)));
        assert!(!disabled.contains(&(0, 2)));
    }
}
