//! Broad-phase collision detection using sweep-and-prune.

use crate::Aabb;

/// Potential collision pair (slot indices, lower first).
pub type CollisionPair = (usize, usize);

/// Endpoint for sweep-and-prune.
#[derive(Clone, Copy)]
struct Endpoint {
    value: f64,
    slot: usize,
    is_min: bool,
}

/// Sweep-and-prune along X. `None` marks an unbounded shape, which pairs
/// with every other slot. Returns sorted pairs of slot indices.
pub fn sweep_and_prune(aabbs: &[Option<Aabb>]) -> Vec<CollisionPair> {
    if aabbs.len() < 2 {
        return Vec::new();
    }

    let mut pairs = Vec::new();

    let mut endpoints: Vec<Endpoint> = Vec::with_capacity(aabbs.len() * 2);
    for (slot, aabb) in aabbs.iter().enumerate() {
        let Some(aabb) = aabb else {
            continue;
        };
        endpoints.push(Endpoint {
            value: aabb.min.x,
            slot,
            is_min: true,
        });
        endpoints.push(Endpoint {
            value: aabb.max.x,
            slot,
            is_min: false,
        });
    }

    // Mins before maxes at equal values so touching boxes still pair.
    endpoints.sort_by(|a, b| a.value.total_cmp(&b.value).then(b.is_min.cmp(&a.is_min)));

    let mut active: Vec<usize> = Vec::new();
    for ep in endpoints {
        if ep.is_min {
            let aabb = aabbs[ep.slot].as_ref();
            for &other in &active {
                let overlaps = match (aabb, aabbs[other].as_ref()) {
                    (Some(a), Some(b)) => a.overlaps(b),
                    _ => true,
                };
                if overlaps {
                    pairs.push((ep.slot.min(other), ep.slot.max(other)));
                }
            }
            active.push(ep.slot);
        } else {
            active.retain(|&x| x != ep.slot);
        }
    }

    for (slot, aabb) in aabbs.iter().enumerate() {
        if aabb.is_some() {
            continue;
        }
        for other in 0..aabbs.len() {
            if other == slot {
                continue;
            }
            // Two unbounded slots pair once, from the lower index.
            if aabbs[other].is_none() && other < slot {
                continue;
            }
            pairs.push((slot.min(other), slot.max(other)));
        }
    }

    pairs.sort_unstable();
    pairs.dedup();
    pairs
}
