//! Per-step event reporting.
//!
//! Events are collected sequentially after the parallel solve and can be
//! drained once the step returns, or forwarded to callbacks registered on
//! the evolution.

use crate::RigidContact;
use pbd_math::Vec3;

/// A contact that received a non-zero impulse this step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub particles: [usize; 2],
    pub location: Vec3,
    /// From `particles[1]` toward `particles[0]`.
    pub normal: Vec3,
    /// Impulse on `particles[0]`; `particles[1]` received the opposite.
    pub accumulated_impulse: Vec3,
    pub velocities: [Vec3; 2],
    pub angular_velocities: [Vec3; 2],
    pub masses: [f64; 2],
    /// Separation at the end of the solve, negative when penetrating.
    pub phi: f64,
}

/// A child released from a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakEvent {
    pub cluster: usize,
    pub particle: usize,
    pub location: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f64,
    /// Strain that broke the child loose.
    pub strain: f64,
}

/// A dynamic body moving faster than the trailing threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingEvent {
    pub particle: usize,
    pub location: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f64,
}

/// Events from the most recent step.
#[derive(Debug, Clone, Default)]
pub struct EventCollector {
    collisions: Vec<CollisionEvent>,
    breaks: Vec<BreakEvent>,
    trailing: Vec<TrailingEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous step's events.
    pub fn begin_frame(&mut self) {
        self.collisions.clear();
        self.breaks.clear();
        self.trailing.clear();
    }

    /// Record `contact` if it carried an impulse.
    pub fn report_contact(
        &mut self,
        contact: &RigidContact,
        velocities: [Vec3; 2],
        angular_velocities: [Vec3; 2],
        masses: [f64; 2],
    ) {
        if !contact.has_impulse() {
            return;
        }
        self.collisions.push(CollisionEvent {
            particles: contact.particles,
            location: contact.location,
            normal: contact.normal,
            accumulated_impulse: contact.accumulated_impulse,
            velocities,
            angular_velocities,
            masses,
            phi: contact.phi,
        });
    }

    pub fn report_break(&mut self, event: BreakEvent) {
        self.breaks.push(event);
    }

    pub fn report_trailing(&mut self, event: TrailingEvent) {
        self.trailing.push(event);
    }

    pub fn collisions(&self) -> &[CollisionEvent] {
        &self.collisions
    }

    pub fn breaks(&self) -> &[BreakEvent] {
        &self.breaks
    }

    pub fn trailing(&self) -> &[TrailingEvent] {
        &self.trailing
    }

    pub fn is_empty(&self) -> bool {
        self.collisions.is_empty() && self.breaks.is_empty() && self.trailing.is_empty()
    }

    pub fn drain_collisions(&mut self) -> Vec<CollisionEvent> {
        std::mem::take(&mut self.collisions)
    }

    pub fn drain_breaks(&mut self) -> Vec<BreakEvent> {
        std::mem::take(&mut self.breaks)
    }

    pub fn drain_trailing(&mut self) -> Vec<TrailingEvent> {
        std::mem::take(&mut self.trailing)
    }
}
