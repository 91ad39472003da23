//! Per-particle force rules.

use pbd_math::Vec3;

/// A force evaluated independently for every dynamic particle.
///
/// Rules are summed in registration order from the particle's committed
/// state at the start of the step.
pub trait ForceRule: Send + Sync {
    fn force(&self, index: usize, x: &Vec3, v: &Vec3, mass: f64) -> Vec3;
}

impl<F> ForceRule for F
where
    F: Fn(usize, &Vec3, &Vec3, f64) -> Vec3 + Send + Sync,
{
    fn force(&self, index: usize, x: &Vec3, v: &Vec3, mass: f64) -> Vec3 {
        self(index, x, v, mass)
    }
}

/// Uniform gravitational acceleration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerParticleGravity {
    pub acceleration: Vec3,
}

impl PerParticleGravity {
    pub fn new(direction: Vec3, magnitude: f64) -> Self {
        let direction = pbd_math::try_normalize(&direction).unwrap_or_else(|| -Vec3::z());
        Self {
            acceleration: direction * magnitude,
        }
    }
}

impl ForceRule for PerParticleGravity {
    fn force(&self, _index: usize, _x: &Vec3, _v: &Vec3, mass: f64) -> Vec3 {
        self.acceleration * mass
    }
}

/// Drag opposing velocity, proportional to speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDrag {
    pub coefficient: f64,
}

impl ForceRule for LinearDrag {
    fn force(&self, _index: usize, _x: &Vec3, v: &Vec3, _mass: f64) -> Vec3 {
        -v * self.coefficient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gravity_scales_with_mass() {
        let g = PerParticleGravity::new(Vec3::new(0.0, 0.0, -2.0), 980.0);
        let f = g.force(0, &Vec3::zeros(), &Vec3::zeros(), 2.0);
        assert_relative_eq!(f, Vec3::new(0.0, 0.0, -1960.0));
    }

    #[test]
    fn closures_are_rules() {
        let wind = |_i: usize, _x: &Vec3, _v: &Vec3, m: f64| Vec3::x() * m;
        let rules: Vec<Box<dyn ForceRule>> = vec![Box::new(wind), Box::new(LinearDrag { coefficient: 0.5 })];
        let v = Vec3::new(2.0, 0.0, 0.0);
        let total: Vec3 = rules.iter().map(|r| r.force(0, &Vec3::zeros(), &v, 3.0)).sum();
        assert_relative_eq!(total, Vec3::new(2.0, 0.0, 0.0));
    }
}
